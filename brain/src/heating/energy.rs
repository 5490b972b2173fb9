use anyhow::Result;

use crate::core::time::Duration;
use crate::home::geometry::{Boundary, ConstructionType, House, Orientation, Room, TransitionKind};
use crate::home::items::Item;

use super::calibration::Calibration;
use super::snapshot::{Snapshot, STABLE_TEMPERATURE_MINUTES};
use super::solar::{Location, SunRadiation};
use super::state::{HouseState, RoomState};

/// kJ/h to W.
const KILOJOULE_TO_WATT: f64 = 3.6;

/// An open contact only counts as an open window after this debounce.
const OPEN_WINDOW_DEBOUNCE_CURRENT_MINUTES: i64 = 2;
const OPEN_WINDOW_DEBOUNCE_FORECAST_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Current,
    In4Hours,
    In8Hours,
}

impl Horizon {
    pub fn is_forecast(&self) -> bool {
        *self != Horizon::Current
    }

    pub fn offset(&self) -> Duration {
        match self {
            Horizon::Current => Duration::zero(),
            Horizon::In4Hours => Duration::minutes(240),
            Horizon::In8Hours => Duration::minutes(480),
        }
    }
}

/// Computes the full energy balance of the house at one horizon: conduction,
/// solar gain, ventilation and infiltration losses, and the heat the
/// circulation delivers (actual and "what-if all circuits on").
pub struct EnergyCalculator<'a> {
    house: &'a House,
    calibration: &'a Calibration,
    location: &'a Location,
    snapshot: &'a Snapshot<'a>,
}

struct WallTerms {
    indoor_cooling: f64,
    outdoor_cooling: f64,
    radiation: f64,
    capacity: f64,
}

struct TransitionTerms {
    closed_window_energy: f64,
    open_window_energy: f64,
    radiation: f64,
    open_window_count: u32,
}

impl<'a> EnergyCalculator<'a> {
    pub fn new(
        house: &'a House,
        calibration: &'a Calibration,
        location: &'a Location,
        snapshot: &'a Snapshot<'a>,
    ) -> Self {
        Self {
            house,
            calibration,
            location,
            snapshot,
        }
    }

    pub fn evaluate(&self, horizon: Horizon, temp_diff_offset: f64) -> Result<HouseState> {
        let is_forecast = horizon.is_forecast();
        let time = self.snapshot.now() + horizon.offset();

        let (possible_circulation_diff, possible_pump_speed) =
            self.possible_heating_energy(is_forecast)?;
        let (circulation_diff, pump_speed, heating_debug) = self.heating_energy(is_forecast)?;
        let volume_factor = self.heating_volume_factor(is_forecast)?;

        let ventilation_total =
            self.ventilation_energy(temp_diff_offset)? / KILOJOULE_TO_WATT;

        let cloud_cover = self.snapshot.decimal(&Item::CloudCover)?;
        let sun = SunRadiation::at(time, cloud_cover, self.location);

        let outdoor_temperature = self.snapshot.decimal(&Item::OutdoorTemperature)?;

        let mut house_state = HouseState::default();
        house_state.reference_temperature = outdoor_temperature;
        house_state.heating_pump_speed = pump_speed;
        house_state.heating_volume_factor = volume_factor;
        house_state.sun_south_radiation = sun.south;
        house_state.sun_west_radiation = sun.west;
        house_state.sun_debug = sun.debug.clone();
        house_state.heating_debug = heating_debug;

        for room in self.house.rooms() {
            let current_temperature = self
                .snapshot
                .stable(&Item::Temperature(room.name().to_owned()), STABLE_TEMPERATURE_MINUTES)?;

            let walls = self.wall_terms(room, current_temperature, &sun)?;
            let transitions =
                self.transition_terms(room, current_temperature, &sun, walls.outdoor_cooling, is_forecast)?;

            let outdoor_wall_energy = walls.outdoor_cooling + transitions.closed_window_energy;

            let (heating_volume, heating_radiation, possible_heating_volume, possible_heating_radiation) =
                match room.heating_volume() {
                    Some(room_heating_volume) => {
                        let active = pump_speed > 0.0
                            && self
                                .snapshot
                                .switch(&Item::HeatingCircuit(room.name().to_owned()))?;
                        let (heating_volume, heating_radiation) = if active {
                            self.heating_radiation(
                                volume_factor,
                                room_heating_volume,
                                circulation_diff,
                                pump_speed,
                            )
                        } else {
                            (0.0, 0.0)
                        };

                        let (possible_volume, possible_radiation) = self.heating_radiation(
                            1.0,
                            room_heating_volume,
                            possible_circulation_diff,
                            possible_pump_speed,
                        );

                        (heating_volume, heating_radiation, possible_volume, possible_radiation)
                    }
                    None => (0.0, 0.0, 0.0, 0.0),
                };

            let ventilation_energy =
                room.volume() * ventilation_total / self.house.total_volume();
            let leak_energy =
                self.leaking_energy(room.volume(), current_temperature, outdoor_temperature)
                    / KILOJOULE_TO_WATT;

            house_state.add_room(RoomState {
                name: room.name().to_owned(),
                current_temperature,
                open_window_count: transitions.open_window_count,
                buffer_capacity: walls.capacity,
                indoor_wall_energy: walls.indoor_cooling,
                outdoor_wall_energy,
                wall_radiation: walls.radiation,
                ventilation_energy,
                leak_energy,
                window_energy: transitions.open_window_energy,
                window_radiation: transitions.radiation,
                heating_volume,
                heating_radiation,
                possible_heating_volume,
                possible_heating_radiation,
                charged_energy: 0.0,
            });
        }

        Ok(house_state)
    }

    /// Conductive exchange of one building element, negated so losses come out
    /// negative. Reference is the horizon's outdoor temperature for exterior
    /// elements, the stabilized temperature of the bound room otherwise.
    fn cooling_energy(
        &self,
        area: f64,
        current_temperature: f64,
        construction: &ConstructionType,
        bound: &Boundary,
    ) -> Result<f64> {
        let u_value = match construction.u_value {
            Some(u_value) => u_value,
            None => return Ok(0.0),
        };

        let reference_item = match bound.bound_room() {
            Some(room) => Item::Temperature(room.to_owned()),
            None => Item::OutdoorTemperature,
        };
        let reference_temperature = self
            .snapshot
            .stable(&reference_item, STABLE_TEMPERATURE_MINUTES)?;

        let cooling_per_kelvin =
            (u_value + construction.u_offset) * area * construction.factor;
        let cooling_total = cooling_per_kelvin * (current_temperature - reference_temperature);

        Ok(if cooling_total != 0.0 { -cooling_total } else { 0.0 })
    }

    fn wall_terms(&self, room: &Room, current_temperature: f64, sun: &SunRadiation) -> Result<WallTerms> {
        let mut terms = WallTerms {
            indoor_cooling: 0.0,
            outdoor_cooling: 0.0,
            radiation: 0.0,
            capacity: 0.0,
        };

        for wall in room.walls() {
            let cooling =
                self.cooling_energy(wall.area, current_temperature, &wall.construction, &wall.bound)?;

            if wall.bound == Boundary::Outside {
                terms.outdoor_cooling += cooling;
                let facade_radiation = match wall.orientation {
                    Orientation::South => sun.south,
                    Orientation::West => sun.west,
                    Orientation::Other => 0.0,
                };
                terms.radiation += wall.area * facade_radiation * self.calibration.wall_absorption;
            } else {
                terms.indoor_cooling += cooling;
            }

            terms.capacity += wall.area * wall.construction.capacity / KILOJOULE_TO_WATT;
        }

        Ok(terms)
    }

    fn transition_terms(
        &self,
        room: &Room,
        current_temperature: f64,
        sun: &SunRadiation,
        outdoor_wall_cooling: f64,
        is_forecast: bool,
    ) -> Result<TransitionTerms> {
        let mut terms = TransitionTerms {
            closed_window_energy: 0.0,
            open_window_energy: 0.0,
            radiation: 0.0,
            open_window_count: 0,
        };

        let debounce_minutes = if is_forecast {
            OPEN_WINDOW_DEBOUNCE_FORECAST_MINUTES
        } else {
            OPEN_WINDOW_DEBOUNCE_CURRENT_MINUTES
        };

        for transition in room.transitions() {
            terms.closed_window_energy += self.cooling_energy(
                transition.area,
                current_temperature,
                &transition.construction,
                &transition.bound,
            )?;

            if let Some(contact) = &transition.contact {
                let contact_item = Item::WindowContact(contact.clone());
                if self.snapshot.switch(&contact_item)?
                    && self.snapshot.update_older_than(&contact_item, debounce_minutes)?
                {
                    terms.open_window_count += 1;
                }
            }

            if transition.kind == TransitionKind::Window {
                if let Some(radiation_area) = transition.radiation_area {
                    let shutter_open = is_forecast
                        || match &transition.shutter {
                            None => true,
                            Some(shutter) => {
                                self.snapshot.decimal(&Item::ShutterPosition(shutter.clone()))? == 0.0
                            }
                        };

                    if shutter_open {
                        let facade_radiation = match transition.orientation {
                            Orientation::South => sun.south,
                            Orientation::West => sun.west,
                            Orientation::Other => 0.0,
                        };
                        terms.radiation += radiation_area
                            * facade_radiation
                            * self.calibration.window_transmittance;
                    }
                }
            }
        }

        // An open window costs the room about its exterior wall loss again;
        // only meaningful for the current horizon.
        terms.open_window_energy = if is_forecast {
            0.0
        } else {
            outdoor_wall_cooling * terms.open_window_count as f64
        };

        Ok(terms)
    }

    /// Whole-house ventilation loss in kJ, negated.
    fn ventilation_energy(&self, temp_diff_offset: f64) -> Result<f64> {
        let level = self.snapshot.decimal(&Item::VentilationLevel)?;
        let mut temperature_diff = self.snapshot.decimal(&Item::VentilationOutgoingTemperature)?
            - self.snapshot.decimal(&Item::VentilationIncomingTemperature)?;

        // outdoor temperature changes bleed into the supply/return differential
        if temp_diff_offset != 0.0 {
            let ventilation_offset = temp_diff_offset / 4.0;
            if temperature_diff + ventilation_offset > 0.0 {
                temperature_diff += ventilation_offset;
            }
        }

        let volume = self.calibration.ventilation_volume(level);
        let u_value = volume * self.calibration.air_density * self.calibration.air_heat_capacity;
        let energy = u_value * temperature_diff;

        Ok(if energy != 0.0 { -energy } else { 0.0 })
    }

    /// Blower-door infiltration loss of one room in kJ, negated.
    /// See http://www.luftdicht.de/Paul-Luftvolumenstrom_durch_Undichtheiten.pdf
    fn leaking_energy(&self, volume: f64, current_temperature: f64, outdoor_temperature: f64) -> f64 {
        let calibration = self.calibration;
        let temperature_diff = current_temperature - outdoor_temperature;

        let shielding = (0.1 * 0.4) / calibration.leaking_n50;
        let leaking_volume = (volume * calibration.leaking_n50 * calibration.leaking_e)
            / (1.0 + (calibration.leaking_f / calibration.leaking_e) * shielding * shielding);
        let u_value = leaking_volume * calibration.air_density * calibration.air_heat_capacity;
        let energy = u_value * temperature_diff;

        if energy != 0.0 {
            -energy
        } else {
            0.0
        }
    }

    /// Circulation differential and pump speed if all circuits could run,
    /// derived from the heating curve instead of live pipe temperatures.
    fn possible_heating_energy(&self, is_forecast: bool) -> Result<(f64, f64)> {
        let mut temperatures = Vec::new();
        for room in self.house.heated_rooms() {
            if is_forecast
                || self
                    .snapshot
                    .switch(&Item::HeatingCircuit(room.name().to_owned()))?
            {
                temperatures.push(
                    self.snapshot
                        .stable(&Item::Temperature(room.name().to_owned()), STABLE_TEMPERATURE_MINUTES)?,
                );
            }
        }

        // no circuit active: average target temperature is the best estimate
        if temperatures.is_empty() {
            for room in self.house.heated_rooms() {
                temperatures
                    .push(self.snapshot.decimal(&Item::TargetTemperature(room.name().to_owned()))?);
            }
        }

        let pipe_in = temperatures.iter().sum::<f64>() / temperatures.len() as f64
            + self.calibration.pipe_in_offset;

        let outdoor_temperature = self.snapshot.decimal(&Item::OutdoorTemperature)?;
        let pipe_out = self.calibration.pipe_out_temperature(outdoor_temperature);

        Ok((pipe_out - pipe_in, self.calibration.possible_pump_speed))
    }

    /// Actual circulation differential; zero when the burner or pump is off
    /// and for forecast horizons, which model availability rather than the
    /// present actuation.
    fn heating_energy(&self, is_forecast: bool) -> Result<(f64, f64, String)> {
        let power = self.snapshot.decimal(&Item::HeatingPower)?;
        let pump_speed = self.snapshot.decimal(&Item::HeatingPumpSpeed)?;

        if power == 0.0 || pump_speed == 0.0 || is_forecast {
            return Ok((0.0, 0.0, String::new()));
        }

        let pipe_out = self.snapshot.decimal(&Item::HeatingPipeOutTemperature)?;
        let pipe_in = self.snapshot.decimal(&Item::HeatingPipeInTemperature)?;
        let circulation_diff = pipe_out - pipe_in;

        let debug = format!(
            "circulation {:.1} K (out {:.1} °C, in {:.1} °C, pump {:.0} %)",
            circulation_diff, pipe_out, pipe_in, pump_speed
        );

        Ok((circulation_diff, pump_speed, debug))
    }

    /// Share of the circulation a room receives, plus the energy it delivers.
    fn heating_radiation(
        &self,
        volume_factor: f64,
        room_heating_volume: f64,
        circulation_diff: f64,
        pump_speed: f64,
    ) -> (f64, f64) {
        let pump_volume = (room_heating_volume * volume_factor * pump_speed) / 100.0;

        // liter to m³
        let energy =
            self.calibration.heating_reference_energy * (pump_volume / 1000.0) * circulation_diff;

        (pump_volume, energy)
    }

    /// 60% of the total heating volume is deliverable with barely any circuit
    /// open, 100% with all of them; linear in between.
    fn heating_volume_factor(&self, is_forecast: bool) -> Result<f64> {
        let mut active_heating_volume = 0.0;

        for room in self.house.heated_rooms() {
            if is_forecast
                || self
                    .snapshot
                    .switch(&Item::HeatingCircuit(room.name().to_owned()))?
            {
                active_heating_volume += room.heating_volume().unwrap_or(0.0);
            }
        }

        let percent = (active_heating_volume * 40.0 / self.house.total_heating_volume()) + 60.0;
        Ok(percent / 100.0)
    }
}
