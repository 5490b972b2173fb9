use std::collections::HashMap;
use std::fmt::Display;

use serde::Serialize;

use crate::core::unit::DegreeCelsius;

/// Per-room energy terms at one horizon. Sign convention: positive terms heat
/// the room, losses are stored negated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomState {
    pub name: String,
    pub current_temperature: f64,
    pub open_window_count: u32,
    /// Energy to raise the room mass by 1 K, Wh/K.
    pub buffer_capacity: f64,
    pub indoor_wall_energy: f64,
    pub outdoor_wall_energy: f64,
    pub wall_radiation: f64,
    pub ventilation_energy: f64,
    pub leak_energy: f64,
    pub window_energy: f64,
    pub window_radiation: f64,
    pub heating_volume: f64,
    pub heating_radiation: f64,
    pub possible_heating_volume: f64,
    pub possible_heating_radiation: f64,
    /// Buffer charge level, set by the charge tracker after the horizon runs.
    pub charged_energy: f64,
}

impl RoomState {
    /// One buffer "slot" is the energy for 0.1 °C of room mass.
    pub fn buffer_slot_capacity(&self) -> f64 {
        self.buffer_capacity * 0.1
    }

    pub fn passive_saldo(&self) -> f64 {
        self.indoor_wall_energy
            + self.outdoor_wall_energy
            + self.wall_radiation
            + self.ventilation_energy
            + self.leak_energy
            + self.window_energy
            + self.window_radiation
    }

    pub fn active_saldo(&self) -> f64 {
        self.passive_saldo() + self.heating_radiation
    }

    pub fn active_possible_saldo(&self) -> f64 {
        self.passive_saldo() + self.possible_heating_radiation
    }
}

/// House aggregate of one horizon run; sums of the room terms plus the
/// house-wide heating circulation and sun figures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HouseState {
    rooms: HashMap<String, RoomState>,
    pub reference_temperature: f64,
    pub open_window_count: u32,
    pub buffer_capacity: f64,
    pub indoor_wall_energy: f64,
    pub outdoor_wall_energy: f64,
    pub wall_radiation: f64,
    pub ventilation_energy: f64,
    pub leak_energy: f64,
    pub window_energy: f64,
    pub window_radiation: f64,
    pub heating_pump_speed: f64,
    pub heating_volume: f64,
    pub heating_radiation: f64,
    pub possible_heating_volume: f64,
    pub possible_heating_radiation: f64,
    pub heating_volume_factor: f64,
    pub sun_south_radiation: f64,
    pub sun_west_radiation: f64,
    pub sun_debug: String,
    pub heating_debug: String,
}

impl HouseState {
    pub fn add_room(&mut self, state: RoomState) {
        self.open_window_count += state.open_window_count;
        self.buffer_capacity += state.buffer_capacity;
        self.indoor_wall_energy += state.indoor_wall_energy;
        self.outdoor_wall_energy += state.outdoor_wall_energy;
        self.wall_radiation += state.wall_radiation;
        self.ventilation_energy += state.ventilation_energy;
        self.leak_energy += state.leak_energy;
        self.window_energy += state.window_energy;
        self.window_radiation += state.window_radiation;
        self.heating_volume += state.heating_volume;
        self.heating_radiation += state.heating_radiation;
        self.possible_heating_volume += state.possible_heating_volume;
        self.possible_heating_radiation += state.possible_heating_radiation;

        self.rooms.insert(state.name.clone(), state);
    }

    pub fn room(&self, name: &str) -> Option<&RoomState> {
        self.rooms.get(name)
    }

    pub fn room_mut(&mut self, name: &str) -> Option<&mut RoomState> {
        self.rooms.get_mut(name)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomState> {
        self.rooms.values()
    }

    pub fn passive_saldo(&self) -> f64 {
        self.indoor_wall_energy
            + self.outdoor_wall_energy
            + self.wall_radiation
            + self.ventilation_energy
            + self.leak_energy
            + self.window_energy
            + self.window_radiation
    }
}

/// Human-auditable classification of a room's heating situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeatingInfo {
    Window,
    Warm,
    Cold,
    Charge,
    Unload,
    Loaded,
}

impl Display for HeatingInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            HeatingInfo::Window => "WINDOW",
            HeatingInfo::Warm => "WARM",
            HeatingInfo::Cold => "COLD",
            HeatingInfo::Charge => "CHARGE",
            HeatingInfo::Unload => "UNLOAD",
            HeatingInfo::Loaded => "LOADED",
        };
        write!(f, "{tag}")
    }
}

/// Time needed to deliver a demanded energy. `Infinite` replaces the float
/// sentinel of loosely-typed setups: it is returned whenever the deliverable
/// heating rate is non-positive and keeps display and comparisons well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DemandTime {
    Hours(f64),
    Infinite,
}

impl DemandTime {
    pub fn exceeds_minutes(&self, minutes: f64) -> bool {
        match self {
            DemandTime::Hours(hours) => hours * 60.0 > minutes,
            DemandTime::Infinite => true,
        }
    }
}

impl Display for DemandTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemandTime::Infinite => write!(f, "~"),
            DemandTime::Hours(hours) => {
                let minutes = hours * 60.0;
                if minutes < 1.0 {
                    write!(f, "<1")
                } else {
                    write!(f, "{}", minutes.round() as i64)
                }
            }
        }
    }
}

/// Heating demand of a room. Callers branch on the variant instead of
/// interpreting a sign-coded number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Demand {
    /// Window open, do not heat.
    Skip,
    /// Nothing needed.
    None,
    Amount { energy: f64, time: DemandTime },
}

impl Demand {
    pub fn amount(&self) -> Option<(f64, DemandTime)> {
        match self {
            Demand::Amount { energy, time } => Some((*energy, *time)),
            _ => None,
        }
    }

    pub fn energy(&self) -> f64 {
        match self {
            Demand::Amount { energy, .. } => *energy,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ForcedTag {
    /// Morning pre-heat before night mode ends.
    Pre,
    /// Cold-floor catch-up heating.
    ColdFloor,
}

impl Display for ForcedTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForcedTag::Pre => write!(f, "PRE"),
            ForcedTag::ColdFloor => write!(f, "CF"),
        }
    }
}

/// The per-room decision of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RoomHeatingState {
    pub room: String,
    info: HeatingInfo,
    demand: Demand,
    pub target_temperature: DegreeCelsius,
    pub night_reduction: f64,
    pub outdoor_reduction: f64,
    pub lazy_reduction: f64,
    pub charged_buffer: f64,
    pub adjusted_buffer: Option<f64>,
    pub forced: Option<ForcedTag>,
    pub forced_debug: String,
}

impl RoomHeatingState {
    pub fn new(room: &str, info: HeatingInfo) -> Self {
        Self {
            room: room.to_owned(),
            demand: if info == HeatingInfo::Window {
                Demand::Skip
            } else {
                Demand::None
            },
            info,
            target_temperature: DegreeCelsius(0.0),
            night_reduction: 0.0,
            outdoor_reduction: 0.0,
            lazy_reduction: 0.0,
            charged_buffer: 0.0,
            adjusted_buffer: None,
            forced: None,
            forced_debug: String::new(),
        }
    }

    pub fn info(&self) -> HeatingInfo {
        self.info
    }

    pub fn demand(&self) -> Demand {
        self.demand
    }

    /// A window-open state never carries a positive demand.
    pub fn set_demand(&mut self, energy: f64, time: DemandTime) {
        if self.info != HeatingInfo::Window {
            self.demand = Demand::Amount { energy, time };
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HouseHeatingState {
    rooms: HashMap<String, RoomHeatingState>,
    pub heating_requested: bool,
}

impl HouseHeatingState {
    pub fn set_room_state(&mut self, state: RoomHeatingState) {
        self.rooms.insert(state.room.clone(), state);
    }

    pub fn room(&self, name: &str) -> Option<&RoomHeatingState> {
        self.rooms.get(name)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomHeatingState> {
        self.rooms.values()
    }
}
