mod buffer;
mod calibration;
mod demand;
mod energy;
mod schedule;
mod snapshot;
mod solar;
mod state;

#[cfg(test)]
pub mod test_support;

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::core::time::{DateTime, Duration};
use crate::core::unit::{DegreeCelsius, Percent, Watt};
use crate::home::geometry::{House, Room};
use crate::home::items::Item;
use crate::port::ValueStore;

pub use calibration::Calibration;
pub use energy::{EnergyCalculator, Horizon};
pub use solar::Location;
pub use state::{
    Demand, DemandTime, ForcedTag, HeatingInfo, HouseHeatingState, HouseState, RoomHeatingState,
    RoomState,
};

use snapshot::{Snapshot, STABLE_TEMPERATURE_MINUTES};

/// Sensor staleness thresholds before safe fallbacks kick in.
const VENTILATION_STALE_MINUTES: i64 = 120;
const FORECAST_STALE_MINUTES: i64 = 360;

/// Cloud cover assumed when the forecast is unusable; one more than full
/// overcast, so the radiation terms stay pessimistic.
const FALLBACK_CLOUD_COVER: f64 = 9.0;

/// A room-level decision that must survive subsequent cycles: once a forced
/// heating starts it keeps demanding until the buffer reaches its target
/// charge, however the regular evaluation changes its mind in between.
#[derive(Debug, Clone, Serialize)]
pub struct ForcedHeating {
    pub state: RoomHeatingState,
    pub target_charge: f64,
}

/// Everything the engine carries from one cycle to the next.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineState {
    last_runtime: Option<DateTime>,
    stable_temperature_references: HashMap<String, f64>,
    forced_heatings: HashMap<String, ForcedHeating>,
}

pub struct Engine {
    house: House,
    calibration: Calibration,
    location: Location,
    state: EngineState,
}

impl Engine {
    pub fn new(house: House, calibration: Calibration, location: Location) -> Self {
        Self {
            house,
            calibration,
            location,
            state: EngineState::default(),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// One full evaluation cycle: energy balance at the three horizons,
    /// charge tracking, and the per-room heating decision.
    pub fn calculate(
        &mut self,
        store: &dyn ValueStore,
        now: DateTime,
        heating_active: bool,
    ) -> Result<(HouseState, HouseHeatingState)> {
        let snapshot = Snapshot::new(store, now);
        self.apply_stale_fallbacks(&snapshot)?;

        let org_outdoor =
            snapshot.stable(&Item::OutdoorTemperature, STABLE_TEMPERATURE_MINUTES)?;
        let org_cloud = snapshot.decimal(&Item::CloudCover)?;

        let calculator =
            EnergyCalculator::new(&self.house, &self.calibration, &self.location, &snapshot);

        let forecast_8 = snapshot.decimal(&Item::OutdoorTemperatureForecast8)?;
        snapshot.set_override(Item::OutdoorTemperature, forecast_8);
        snapshot.set_override(
            Item::CloudCover,
            snapshot.decimal(&Item::CloudCoverForecast8)?,
        );
        let mut cr8 = calculator.evaluate(Horizon::In8Hours, org_outdoor - forecast_8)?;

        let forecast_4 = snapshot.decimal(&Item::OutdoorTemperatureForecast4)?;
        snapshot.set_override(Item::OutdoorTemperature, forecast_4);
        snapshot.set_override(
            Item::CloudCover,
            snapshot.decimal(&Item::CloudCoverForecast4)?,
        );
        let mut cr4 = calculator.evaluate(Horizon::In4Hours, org_outdoor - forecast_4)?;

        snapshot.set_override(Item::OutdoorTemperature, org_outdoor);
        snapshot.set_override(Item::CloudCover, org_cloud);
        let mut cr = calculator.evaluate(Horizon::Current, 0.0)?;

        log_horizon("8h", &cr8);
        log_horizon("4h", &cr4);
        log_horizon("now", &cr);

        let holiday = snapshot.switch(&Item::Holiday)?;
        let night_mode_active = schedule::is_night_mode(now, holiday, heating_active);
        let night_reduction = if night_mode_active {
            schedule::NIGHT_REDUCTION
        } else {
            0.0
        };

        let elapsed_seconds = match self.state.last_runtime {
            Some(last) => now.elapsed_since(last).as_secs_f64(),
            None => buffer::FIRST_CYCLE_SECONDS,
        };

        let mut hhs = HouseHeatingState::default();
        let mut heating_requested = false;

        let heated_rooms: Vec<String> = self
            .house
            .heated_rooms()
            .map(|room| room.name().to_owned())
            .collect();

        for name in heated_rooms {
            let update = {
                let rs = room_state(&cr, &name)?;
                buffer::charge_level(
                    &snapshot,
                    &name,
                    rs,
                    &mut self.state.stable_temperature_references,
                    elapsed_seconds,
                )?
            };
            for horizon_state in [&mut cr, &mut cr4, &mut cr8] {
                if let Some(rs) = horizon_state.room_mut(&name) {
                    rs.charged_energy = update.charge;
                }
            }

            let rhs = match self.restore_forced_heating(&name, &cr, update.adjustment)? {
                Some(rhs) => rhs,
                None => {
                    let room = self
                        .house
                        .room(&name)
                        .ok_or_else(|| anyhow!("unknown room {name}"))?;
                    let rs = room_state(&cr, &name)?;

                    // each room weighs its own balance; a sunlit facade on one
                    // side must not reduce the targets on the other
                    let outdoor_reduction = demand::outdoor_reduction(
                        rs.passive_saldo(),
                        room_state(&cr4, &name)?.passive_saldo(),
                        room_state(&cr8, &name)?.passive_saldo(),
                    );

                    let mut rhs = demand::room_demand(
                        &snapshot,
                        room,
                        rs,
                        &self.state.stable_temperature_references,
                        outdoor_reduction,
                        night_reduction,
                        heating_active,
                    )?;
                    self.forced_heuristics(
                        &snapshot,
                        room,
                        rs,
                        &mut rhs,
                        outdoor_reduction,
                        night_mode_active,
                        holiday,
                        heating_active,
                    )?;
                    rhs
                }
            };

            if let Demand::Amount { energy, time } = rhs.demand() {
                if (heating_active && energy > 0.0)
                    || time.exceeds_minutes(schedule::MIN_HEATING_TIME_MINUTES as f64)
                {
                    heating_requested = true;
                }
            }

            log_room(&rhs);
            hhs.set_room_state(rhs);
        }

        hhs.heating_requested = heating_requested;

        // a forced heating only latches once the house actually fires
        if heating_requested {
            for room in self.house.heated_rooms() {
                let name = room.name();
                if self.state.forced_heatings.contains_key(name) {
                    continue;
                }
                let Some(rhs) = hhs.room(name) else { continue };
                let Some(tag) = rhs.forced else { continue };

                let charge = room_state(&cr, name)?.charged_energy;
                let target_charge = charge + rhs.demand().energy();
                tracing::info!(
                    "Forced heating ({tag}) of room {name} registered, target charge {target_charge:.1} Wh"
                );
                self.state.forced_heatings.insert(
                    name.to_owned(),
                    ForcedHeating {
                        state: rhs.clone(),
                        target_charge,
                    },
                );
            }
        }

        self.state.last_runtime = Some(now);

        Ok((cr, hhs))
    }

    /// Replaces unusable sensor groups with safe values: a dead ventilation
    /// unit stops costing energy, a dead weather forecast degrades to the
    /// current conditions under an overcast sky.
    fn apply_stale_fallbacks(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.update_older_than(&Item::VentilationFilterRuntime, VENTILATION_STALE_MINUTES)? {
            tracing::warn!("Ventilation values are stale, assuming the unit is off");
            snapshot.set_override(Item::VentilationLevel, 1.0);
            snapshot.set_override(Item::VentilationOutgoingTemperature, 0.0);
            snapshot.set_override(Item::VentilationIncomingTemperature, 0.0);
        }

        if snapshot.update_older_than(&Item::OutdoorTemperatureForecast4, FORECAST_STALE_MINUTES)? {
            tracing::warn!("Weather forecast is stale, using current conditions");
            let outdoor = snapshot.decimal(&Item::OutdoorTemperature)?;
            snapshot.set_override(Item::OutdoorTemperatureForecast4, outdoor);
            snapshot.set_override(Item::OutdoorTemperatureForecast8, outdoor);
            snapshot.set_override(Item::CloudCoverForecast4, FALLBACK_CLOUD_COVER);
            snapshot.set_override(Item::CloudCoverForecast8, FALLBACK_CLOUD_COVER);
        }

        Ok(())
    }

    /// Keeps an active forced heating alive: its remaining demand is the gap
    /// between the latched target charge and the current buffer level. The
    /// latch is released once the gap closes, and its target follows any
    /// charge the tracker booked out against a temperature rise.
    fn restore_forced_heating(
        &mut self,
        room_name: &str,
        cr: &HouseState,
        charge_adjustment: f64,
    ) -> Result<Option<RoomHeatingState>> {
        if charge_adjustment > 0.0 {
            if let Some(latch) = self.state.forced_heatings.get_mut(room_name) {
                latch.target_charge -= charge_adjustment;
            }
        }

        let Some(latch) = self.state.forced_heatings.get(room_name) else {
            return Ok(None);
        };

        let rs = room_state(cr, room_name)?;
        let remaining = latch.target_charge - rs.charged_energy;

        if remaining < 0.0 {
            tracing::info!("Forced heating of room {room_name} completed");
            self.state.forced_heatings.remove(room_name);
            return Ok(None);
        }

        let mut rhs = latch.state.clone();
        rhs.set_demand(
            remaining,
            demand::demand_time(remaining, rs.active_possible_saldo()),
        );
        Ok(Some(rhs))
    }

    /// Pre-heat (PRE) and cold-floor (CF) handling. Both only apply to a room
    /// the regular evaluation left without demand.
    #[allow(clippy::too_many_arguments)]
    fn forced_heuristics(
        &self,
        snapshot: &Snapshot,
        room: &Room,
        rs: &RoomState,
        rhs: &mut RoomHeatingState,
        outdoor_reduction: f64,
        night_mode_active: bool,
        holiday: bool,
        heating_active: bool,
    ) -> Result<()> {
        if matches!(rhs.demand(), Demand::Skip) || rhs.demand().energy() > 0.0 {
            return Ok(());
        }

        let room_name = room.name();
        let now = snapshot.now();
        let mut not_needed: Vec<&str> = Vec::new();
        let mut wrong_time: Vec<&str> = Vec::new();
        let mut other: Vec<String> = Vec::new();

        // PRE: while night mode still runs in the morning, check what the room
        // would need at its day target and start early enough to be done when
        // the night window ends.
        if night_mode_active && now.hour() < 12 {
            let day_rhs = demand::room_demand(
                snapshot,
                room,
                rs,
                &self.state.stable_temperature_references,
                outdoor_reduction,
                0.0,
                heating_active,
            )?;

            match day_rhs.demand().amount() {
                Some((energy, time)) if energy > 0.0 => {
                    let minutes = demand::limit_demand_time(room_name, time) * 60.0;
                    let completion = now + Duration::minutes(minutes.round() as i64);
                    if !schedule::is_night_time(completion, holiday) {
                        *rhs = day_rhs;
                        rhs.forced = Some(ForcedTag::Pre);
                    } else {
                        other.push(format!(
                            "'PRE' too early for {energy:.1} Wh in {minutes:.0} min"
                        ));
                    }
                }
                _ => not_needed.push("PRE"),
            }
        } else {
            wrong_time.push("PRE");
        }

        // CF: warm the floor once in the morning and once in the evening even
        // if the air temperature asks for nothing.
        let last_change = snapshot.last_updated(&Item::HeatingDemand(room_name.to_owned()))?;
        if !heating_active
            && schedule::possible_cold_floor_heating(now, holiday, night_mode_active, last_change)
        {
            let needed_time = schedule::cold_floor_heating_time(now, last_change);
            let needed_energy = needed_time * rs.active_possible_saldo();

            if rhs.demand().energy() < needed_energy {
                let minutes =
                    demand::limit_demand_time(room_name, DemandTime::Hours(needed_time)) * 60.0;
                let completion = now + Duration::minutes(minutes.round() as i64);
                if !schedule::is_night_time(completion, holiday) {
                    rhs.set_demand(needed_energy, DemandTime::Hours(needed_time));
                    rhs.forced = Some(ForcedTag::ColdFloor);
                } else {
                    other.push(format!(
                        "'CF' too late for {needed_energy:.1} Wh in {minutes:.0} min"
                    ));
                }
            } else {
                not_needed.push("CF");
            }
        } else {
            wrong_time.push("CF");
        }

        if rhs.forced.is_none() {
            let mut parts = Vec::new();
            if !not_needed.is_empty() {
                parts.push(format!("{} not needed", not_needed.join(" & ")));
            }
            if !wrong_time.is_empty() {
                parts.push(format!("{} wrong time", wrong_time.join(" & ")));
            }
            parts.extend(other);
            if !parts.is_empty() {
                rhs.forced_debug = format!(" ({})", parts.join(", "));
            }
        }

        Ok(())
    }
}

fn room_state<'a>(state: &'a HouseState, room_name: &str) -> Result<&'a RoomState> {
    state
        .room(room_name)
        .ok_or_else(|| anyhow!("no energy balance for room {room_name}"))
}

fn log_horizon(label: &str, state: &HouseState) {
    if !state.sun_debug.is_empty() {
        tracing::debug!("{label}: {}", state.sun_debug);
    }
    if !state.heating_debug.is_empty() {
        tracing::debug!("{label}: {}", state.heating_debug);
    }
    tracing::info!(
        "{label}: wall {:.1} W/min ({:.1} sun), air {:.1} W/min, window {:.1} W/min ({:.1} sun), heating {:.1} W/min at pump {}",
        Watt(state.indoor_wall_energy + state.outdoor_wall_energy).per_minute(),
        Watt(state.wall_radiation).per_minute(),
        Watt(state.ventilation_energy + state.leak_energy).per_minute(),
        Watt(state.window_energy).per_minute(),
        Watt(state.window_radiation).per_minute(),
        Watt(state.heating_radiation).per_minute(),
        Percent(state.heating_pump_speed),
    );
    tracing::info!(
        "{label}: saldo {:.1} W/min at {}",
        Watt(state.passive_saldo() + state.heating_radiation).per_minute(),
        DegreeCelsius(state.reference_temperature).rounded(1),
    );
}

fn log_room(rhs: &RoomHeatingState) {
    let forced = match rhs.forced {
        Some(tag) => format!(" [{tag}]"),
        None => rhs.forced_debug.clone(),
    };

    match rhs.demand() {
        Demand::Skip => tracing::info!("{:>12}: SKIPPED, window open", rhs.room),
        Demand::Amount { energy, time } if energy > 0.0 => tracing::info!(
            "{:>12}: ON {:.1} Wh in {} min ({}, target {}, buffer {:.1} Wh){}",
            rhs.room,
            energy,
            time,
            rhs.info(),
            rhs.target_temperature,
            rhs.charged_buffer,
            forced,
        ),
        _ => tracing::info!(
            "{:>12}: OFF ({}, target {}, buffer {:.1} Wh){}",
            rhs.room,
            rhs.info(),
            rhs.target_temperature,
            rhs.charged_buffer,
            forced,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heating::test_support::{test_house, test_location, FakeStore};

    fn engine() -> Engine {
        Engine::new(test_house(), Calibration::default(), test_location())
    }

    fn store_with_defaults(now: DateTime) -> FakeStore {
        let store = FakeStore::new(now);
        store.set_decimal(Item::OutdoorTemperature, 0.0);
        store.set_decimal(Item::OutdoorTemperatureForecast4, 1.0);
        store.set_decimal(Item::OutdoorTemperatureForecast8, 2.0);
        store.set_decimal(Item::CloudCover, 8.0);
        store.set_decimal(Item::CloudCoverForecast4, 8.0);
        store.set_decimal(Item::CloudCoverForecast8, 8.0);
        store.set_decimal(Item::VentilationLevel, 15.0);
        store.set_decimal(Item::VentilationOutgoingTemperature, 20.0);
        store.set_decimal(Item::VentilationIncomingTemperature, 18.0);
        store.set_decimal(Item::HeatingPower, 0.0);
        store.set_decimal(Item::HeatingPumpSpeed, 0.0);
        for room in ["livingroom", "bathroom"] {
            store.set_decimal(Item::Temperature(room.to_owned()), 21.0);
            store.set_decimal(Item::TargetTemperature(room.to_owned()), 21.0);
            store.set_decimal(Item::ChargedBuffer(room.to_owned()), 0.0);
        }
        store
    }

    #[test]
    fn cycle_produces_a_decision_for_every_heated_room() {
        let now = DateTime::local(2024, 1, 16, 12, 30).unwrap();
        let store = store_with_defaults(now);
        let mut engine = engine();

        let (cr, hhs) = engine.calculate(&store, now, false).unwrap();

        assert!(hhs.room("livingroom").is_some());
        assert!(hhs.room("bathroom").is_some());
        assert!(cr.room("livingroom").unwrap().charged_energy >= 0.0);
        assert!(cr.room("bathroom").unwrap().charged_energy >= 0.0);
    }

    #[test]
    fn night_mode_reduces_the_target() {
        // Tuesday 03:00: night window, rooms exactly at the reduced target
        let now = DateTime::local(2024, 1, 16, 3, 0).unwrap();
        let store = store_with_defaults(now);
        for room in ["livingroom", "bathroom"] {
            store.set_decimal(Item::Temperature(room.to_owned()), 19.0);
        }

        let mut engine = engine();
        let (_, hhs) = engine.calculate(&store, now, false).unwrap();

        let rhs = hhs.room("livingroom").unwrap();
        assert_eq!(rhs.night_reduction, 2.0);
        assert_ne!(rhs.info(), HeatingInfo::Cold);
        assert_eq!(f64::from(&rhs.target_temperature), 19.0);
    }

    #[test]
    fn cold_floor_heating_latches_until_the_buffer_is_charged() {
        // Tuesday 18:00, heating off, last heating demand 12 hours ago; the
        // buffers hold enough that the regular evaluation asks for nothing
        let now = DateTime::local(2024, 1, 16, 18, 0).unwrap();
        let store = store_with_defaults(now);
        let long_ago = DateTime::local(2024, 1, 16, 6, 0).unwrap();
        for room in ["livingroom", "bathroom"] {
            store.set_updated(Item::HeatingDemand(room.to_owned()), long_ago);
            store.set_decimal(Item::ChargedBuffer(room.to_owned()), 50.0);
        }

        let mut engine = engine();
        let (_, hhs) = engine.calculate(&store, now, false).unwrap();

        let rhs = hhs.room("livingroom").unwrap();
        assert_eq!(rhs.info(), HeatingInfo::Unload);
        assert_eq!(rhs.forced, Some(ForcedTag::ColdFloor));
        let (energy, time) = rhs.demand().amount().unwrap();
        assert!(energy > 0.0);
        assert_eq!(time, DemandTime::Hours(0.75));
        assert!(hhs.heating_requested);
        assert!(engine.state().forced_heatings.contains_key("livingroom"));

        // next cycle restores the latched demand instead of re-deciding
        let (_, hhs) = engine.calculate(&store, now, false).unwrap();
        let restored = hhs.room("livingroom").unwrap();
        assert_eq!(restored.forced, Some(ForcedTag::ColdFloor));
        assert!(restored.demand().energy() > 0.0);

        // once the buffer passed the target charge the latch is released
        store.set_decimal(Item::ChargedBuffer("livingroom".to_owned()), 10_000.0);
        store.set_decimal(Item::ChargedBuffer("bathroom".to_owned()), 10_000.0);
        let (_, hhs) = engine.calculate(&store, now, true).unwrap();

        assert!(engine.state().forced_heatings.is_empty());
        assert_eq!(hhs.room("livingroom").unwrap().forced, None);
    }

    #[test]
    fn positive_demand_keeps_cold_floor_heating_out() {
        // same evening slot, but the empty buffers already produce a charge
        // demand; the catch-up heuristic must not override it
        let now = DateTime::local(2024, 1, 16, 18, 0).unwrap();
        let store = store_with_defaults(now);
        let long_ago = DateTime::local(2024, 1, 16, 6, 0).unwrap();
        for room in ["livingroom", "bathroom"] {
            store.set_updated(Item::HeatingDemand(room.to_owned()), long_ago);
        }

        let mut engine = engine();
        let (_, hhs) = engine.calculate(&store, now, false).unwrap();

        let rhs = hhs.room("livingroom").unwrap();
        assert_eq!(rhs.info(), HeatingInfo::Charge);
        assert!(rhs.demand().energy() > 0.0);
        assert_eq!(rhs.forced, None);
        assert!(engine.state().forced_heatings.is_empty());
    }

    #[test]
    fn outdoor_reduction_follows_each_rooms_own_balance() {
        // clear midsummer midday: only the bathroom has sun-exposed south
        // faces, so only its targets may be reduced
        let now = DateTime::from_iso("2024-06-18T13:00:00+02:00").unwrap();
        let store = store_with_defaults(now);
        store.set_decimal(Item::OutdoorTemperature, 15.0);
        store.set_decimal(Item::OutdoorTemperatureForecast4, 15.0);
        store.set_decimal(Item::OutdoorTemperatureForecast8, 15.0);
        store.set_decimal(Item::CloudCover, 0.0);
        store.set_decimal(Item::CloudCoverForecast4, 0.0);
        store.set_decimal(Item::CloudCoverForecast8, 0.0);

        let mut engine = engine();
        let (cr, hhs) = engine.calculate(&store, now, false).unwrap();

        let livingroom = cr.room("livingroom").unwrap();
        assert_eq!(livingroom.wall_radiation + livingroom.window_radiation, 0.0);
        assert_eq!(hhs.room("livingroom").unwrap().outdoor_reduction, 0.0);

        assert!(cr.room("bathroom").unwrap().passive_saldo() > 0.0);
        assert!(hhs.room("bathroom").unwrap().outdoor_reduction > 0.0);
    }

    #[test]
    fn current_horizon_runs_on_the_stabilized_outdoor_temperature() {
        let now = DateTime::local(2024, 1, 16, 12, 30).unwrap();
        let store = store_with_defaults(now);
        // a fresh spike reads -10, the trailing average still says 0
        store.set_decimal(Item::OutdoorTemperature, -10.0);
        store.set_stable_decimal(Item::OutdoorTemperature, 0.0);

        let mut engine = engine();
        let (cr, _) = engine.calculate(&store, now, false).unwrap();

        assert_eq!(cr.reference_temperature, 0.0);
    }

    #[test]
    fn stale_forecast_falls_back_to_current_conditions() {
        let now = DateTime::local(2024, 1, 16, 12, 30).unwrap();
        let store = store_with_defaults(now);
        store.set_decimal(Item::OutdoorTemperatureForecast8, -20.0);
        store.set_updated(
            Item::OutdoorTemperatureForecast4,
            now - Duration::minutes(7 * 60),
        );

        let mut engine = engine();
        engine.calculate(&store, now, false).unwrap();

        // the absurd forecast never reached the evaluation: with fresh data
        // the 8h horizon would run at -20 °C and dominate the demand
        let (cr, _) = engine.calculate(&store, now, false).unwrap();
        assert_eq!(cr.reference_temperature, 0.0);
    }

    #[test]
    fn repeated_cycles_on_the_same_snapshot_agree() {
        let now = DateTime::local(2024, 1, 16, 12, 30).unwrap();
        let store = store_with_defaults(now);

        let mut engine = engine();
        let (_, first) = engine.calculate(&store, now, false).unwrap();
        let (_, second) = engine.calculate(&store, now, false).unwrap();

        for room in ["livingroom", "bathroom"] {
            assert_eq!(
                first.room(room).unwrap().demand(),
                second.room(room).unwrap().demand()
            );
        }
    }
}
