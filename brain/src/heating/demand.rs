use std::collections::HashMap;

use anyhow::Result;

use crate::core::unit::DegreeCelsius;
use crate::home::geometry::Room;
use crate::home::items::Item;

use super::snapshot::{Snapshot, STABLE_TEMPERATURE_MINUTES};
use super::state::{DemandTime, HeatingInfo, RoomHeatingState, RoomState};

/// Passive saldo at which the outdoor reduction reaches its maximum, W.
const MAX_REDUCTION_SALDO: f64 = 18000.0;

/// Maximum outdoor reduction, Kelvin.
const MAX_REDUCTION: f64 = 2.0;

/// The buffer is only ever charged up to this share of one buffer slot.
const BUFFER_FILL_TARGET: f64 = 0.75;

/// Upper bound for a single demand, hours.
const DEMAND_TIME_LIMIT_HOURS: f64 = 1.5;

/// A contact must be open this long before it suppresses heating; the energy
/// terms use their own, shorter debounce.
const OPEN_WINDOW_DEBOUNCE_MINUTES: i64 = 10;

/// Reduction contribution of one horizon's passive saldo: nothing while the
/// house is losing energy, the full 2 K from 18 kW of gains upwards, linear
/// in between.
fn outdoor_depending_reduction(passive_saldo: f64) -> f64 {
    if passive_saldo <= 0.0 {
        0.0
    } else if passive_saldo > MAX_REDUCTION_SALDO {
        MAX_REDUCTION
    } else {
        passive_saldo * MAX_REDUCTION / MAX_REDUCTION_SALDO
    }
}

/// Target reduction from current and forecast outdoor conditions. The nearer
/// horizons weigh more.
pub fn outdoor_reduction(current_saldo: f64, saldo_in_4h: f64, saldo_in_8h: f64) -> f64 {
    let reduction = outdoor_depending_reduction(current_saldo)
        + outdoor_depending_reduction(saldo_in_4h) * 0.8
        + outdoor_depending_reduction(saldo_in_8h) * 0.6;

    round2(reduction)
}

/// Time to deliver `energy` at the rate the circulation could sustain.
pub fn demand_time(energy: f64, active_possible_saldo: f64) -> DemandTime {
    if active_possible_saldo <= 0.0 {
        DemandTime::Infinite
    } else {
        DemandTime::Hours(energy / active_possible_saldo)
    }
}

/// Caps a demand time at 1.5 hours; anything longer points at a sensor or
/// calibration problem and is logged.
pub fn limit_demand_time(room_name: &str, time: DemandTime) -> f64 {
    match time {
        DemandTime::Hours(hours) if hours <= DEMAND_TIME_LIMIT_HOURS => hours,
        _ => {
            tracing::warn!(
                "Heating time of room {} was limited to {} hours (was {})",
                room_name,
                DEMAND_TIME_LIMIT_HOURS,
                time
            );
            DEMAND_TIME_LIMIT_HOURS
        }
    }
}

/// Decides what a room needs this cycle.
///
/// An open window skips the room. Otherwise the reduced target is compared
/// against the stabilized room temperature; a deficit is served from the
/// buffer first and only the uncovered remainder becomes a demand. A room at
/// its target keeps its buffer topped up to 75% of one slot.
pub fn room_demand(
    snapshot: &Snapshot,
    room: &Room,
    rs: &RoomState,
    references: &HashMap<String, f64>,
    outdoor_reduction: f64,
    night_reduction: f64,
    heating_active: bool,
) -> Result<RoomHeatingState> {
    let room_name = room.name();

    let current = round1(snapshot.stable(
        &Item::Temperature(room_name.to_owned()),
        STABLE_TEMPERATURE_MINUTES,
    )?);
    // target is rounded for display only; the deficit check below runs on the
    // exact reduced value
    let target = snapshot.decimal(&Item::TargetTemperature(room_name.to_owned()))?
        - night_reduction
        - outdoor_reduction;

    let mut charged = rs.charged_energy;
    let mut adjusted_buffer = None;

    // the charge tracker runs on a longer window; a faster rise shows up here
    // first and the latch bookkeeping must not lag behind it
    if let Some(&reference) = references.get(room_name) {
        if current > reference && charged > 0.0 {
            charged = (charged - rs.buffer_capacity * (current - reference)).max(0.0);
            adjusted_buffer = Some(charged);
        }
    }

    if open_window(snapshot, room)? {
        let mut hs = RoomHeatingState::new(room_name, HeatingInfo::Window);
        hs.target_temperature = DegreeCelsius(round1(target));
        hs.night_reduction = night_reduction;
        hs.outdoor_reduction = outdoor_reduction;
        hs.charged_buffer = charged;
        hs.adjusted_buffer = adjusted_buffer;
        return Ok(hs);
    }

    let max_buffer = rs.buffer_slot_capacity() * BUFFER_FILL_TARGET;

    let info;
    let mut lazy_reduction = 0.0;
    let mut demand_energy = None;
    let mut missing = target - current;

    if missing < 0.0 {
        info = HeatingInfo::Warm;
    } else {
        if missing > 0.0 {
            let possible_degrees = charged / rs.buffer_capacity;
            if possible_degrees > missing {
                lazy_reduction = missing;
                charged -= missing * rs.buffer_capacity;
                missing = 0.0;
            } else {
                lazy_reduction = possible_degrees;
                charged = 0.0;
                missing -= possible_degrees;
            }
        }

        if missing > 0.0 {
            info = HeatingInfo::Cold;
            demand_energy = Some(missing * rs.buffer_capacity + max_buffer);
        } else if charged > max_buffer {
            info = HeatingInfo::Loaded;
        } else if !heating_active && charged > 0.0 {
            info = HeatingInfo::Unload;
        } else {
            info = HeatingInfo::Charge;
            demand_energy = Some(max_buffer - charged);
        }
    }

    let mut hs = RoomHeatingState::new(room_name, info);
    if let Some(energy) = demand_energy {
        hs.set_demand(energy, demand_time(energy, rs.active_possible_saldo()));
    }
    hs.target_temperature = DegreeCelsius(round1(target));
    hs.night_reduction = night_reduction;
    hs.outdoor_reduction = outdoor_reduction;
    hs.lazy_reduction = round2(lazy_reduction);
    hs.charged_buffer = charged;
    hs.adjusted_buffer = adjusted_buffer;

    Ok(hs)
}

fn open_window(snapshot: &Snapshot, room: &Room) -> Result<bool> {
    for transition in room.transitions() {
        if let Some(contact) = &transition.contact {
            let item = Item::WindowContact(contact.clone());
            if snapshot.switch(&item)?
                && snapshot.update_older_than(&item, OPEN_WINDOW_DEBOUNCE_MINUTES)?
            {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::{DateTime, Duration};
    use crate::heating::test_support::{test_house, FakeStore};
    use crate::heating::Demand;
    use crate::home::geometry::House;

    fn room_state(current_temperature: f64, charged: f64) -> RoomState {
        RoomState {
            name: "livingroom".to_owned(),
            current_temperature,
            buffer_capacity: 800.0,
            possible_heating_radiation: 600.0,
            charged_energy: charged,
            ..RoomState::default()
        }
    }

    fn snapshot_with(temperature: f64, target: f64, store: &FakeStore) {
        store.set_decimal(Item::Temperature("livingroom".to_owned()), temperature);
        store.set_decimal(Item::TargetTemperature("livingroom".to_owned()), target);
    }

    fn livingroom(house: &House) -> &Room {
        house.room("livingroom").expect("room exists")
    }

    #[test]
    fn outdoor_reduction_blends_the_horizons() {
        // 9 kW is half the saturation saldo => 1 K per horizon before weights
        assert!((outdoor_reduction(9000.0, 9000.0, 9000.0) - 2.4).abs() < 1e-9);
        assert!((outdoor_reduction(9000.0, 0.0, 0.0) - 1.0).abs() < 1e-9);
        assert_eq!(outdoor_reduction(-3000.0, -1000.0, 0.0), 0.0);
        // saturation
        assert!((outdoor_reduction(40000.0, 0.0, 0.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn demand_time_is_infinite_without_deliverable_heating() {
        assert_eq!(demand_time(500.0, -10.0), DemandTime::Infinite);
        assert_eq!(demand_time(500.0, 0.0), DemandTime::Infinite);
        assert_eq!(demand_time(300.0, 600.0), DemandTime::Hours(0.5));
    }

    #[test]
    fn demand_time_is_capped() {
        assert_eq!(limit_demand_time("livingroom", DemandTime::Hours(0.5)), 0.5);
        assert_eq!(limit_demand_time("livingroom", DemandTime::Hours(4.0)), 1.5);
        assert_eq!(limit_demand_time("livingroom", DemandTime::Infinite), 1.5);
    }

    #[test]
    fn long_open_window_skips_the_room_but_keeps_its_bookkeeping() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(18.0, 21.0, &store);
        store.set_switch(Item::WindowContact("livingroom".to_owned()), true);
        store.set_updated(
            Item::WindowContact("livingroom".to_owned()),
            now - Duration::minutes(15),
        );
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(18.0, 100.0),
            &HashMap::new(),
            0.0,
            0.0,
            true,
        )
        .unwrap();

        assert_eq!(hs.info(), HeatingInfo::Window);
        assert_eq!(hs.demand(), Demand::Skip);
        // the skipped room still reports its target and buffer level
        assert_eq!(f64::from(&hs.target_temperature), 21.0);
        assert!((hs.charged_buffer - 100.0).abs() < 1e-9);
    }

    #[test]
    fn briefly_open_window_is_still_evaluated() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(20.0, 21.0, &store);
        store.set_switch(Item::WindowContact("livingroom".to_owned()), true);
        store.set_updated(
            Item::WindowContact("livingroom".to_owned()),
            now - Duration::minutes(5),
        );
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(20.0, 0.0),
            &HashMap::new(),
            0.0,
            0.0,
            true,
        )
        .unwrap();

        // airing for a few minutes does not shut the heating decision off
        assert_eq!(hs.info(), HeatingInfo::Cold);
        assert!(hs.demand().energy() > 0.0);
    }

    #[test]
    fn warm_room_has_no_demand() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(22.0, 21.0, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(22.0, 0.0),
            &HashMap::new(),
            0.0,
            0.0,
            true,
        )
        .unwrap();

        assert_eq!(hs.info(), HeatingInfo::Warm);
        assert_eq!(hs.demand(), Demand::None);
    }

    #[test]
    fn night_reduction_turns_a_cold_room_into_buffer_charging() {
        // 19 °C at a 21 °C target is on point once the 2 K night reduction
        // applies, so the room only wants its buffer topped up
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(19.0, 21.0, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(19.0, 0.0),
            &HashMap::new(),
            0.0,
            2.0,
            true,
        )
        .unwrap();

        assert_eq!(hs.info(), HeatingInfo::Charge);
        // 75% of one buffer slot (800 * 0.1 * 0.75)
        assert!((hs.demand().energy() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn buffer_covers_a_small_deficit_as_lazy_reduction() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(20.5, 21.0, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        // 0.5 K deficit costs 400 Wh; 500 Wh are charged
        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(20.5, 500.0),
            &HashMap::new(),
            0.0,
            0.0,
            true,
        )
        .unwrap();

        assert!((hs.lazy_reduction - 0.5).abs() < 1e-9);
        assert!((hs.charged_buffer - 100.0).abs() < 1e-9);
        // remaining charge is above the 60 Wh fill target
        assert_eq!(hs.info(), HeatingInfo::Loaded);
        assert_eq!(hs.demand(), Demand::None);
    }

    #[test]
    fn uncovered_deficit_becomes_a_cold_demand() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(20.0, 21.0, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        // 1 K deficit = 800 Wh, plus the 60 Wh buffer target
        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(20.0, 0.0),
            &HashMap::new(),
            0.0,
            0.0,
            true,
        )
        .unwrap();

        assert_eq!(hs.info(), HeatingInfo::Cold);
        let (energy, time) = hs.demand().amount().unwrap();
        assert!((energy - 860.0).abs() < 1e-9);
        // 860 Wh at 600 W
        assert_eq!(time, DemandTime::Hours(860.0 / 600.0));
    }

    #[test]
    fn deficit_check_runs_on_the_unrounded_target() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        // 21.04 rounds to the 21.0 the room already has, but the 0.04 K gap
        // still counts as a deficit
        snapshot_with(21.0, 21.04, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(21.0, 0.0),
            &HashMap::new(),
            0.0,
            0.0,
            true,
        )
        .unwrap();

        assert_eq!(hs.info(), HeatingInfo::Cold);
        assert!((hs.demand().energy() - 92.0).abs() < 1e-6);
        // the reported target is rounded for display
        assert_eq!(f64::from(&hs.target_temperature), 21.0);
    }

    #[test]
    fn loaded_buffer_unloads_while_the_heating_is_off() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(21.0, 21.0, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(21.0, 30.0),
            &HashMap::new(),
            0.0,
            0.0,
            false,
        )
        .unwrap();

        assert_eq!(hs.info(), HeatingInfo::Unload);
        assert_eq!(hs.demand(), Demand::None);
    }

    #[test]
    fn fresh_temperature_rise_shrinks_the_charge_before_deciding() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(20.2, 20.2, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();

        let mut references = HashMap::new();
        references.insert("livingroom".to_owned(), 20.0);

        // 0.2 K above the tracked reference at 800 Wh/K removes 160 Wh
        let hs = room_demand(
            &snapshot,
            livingroom(&house),
            &room_state(20.2, 200.0),
            &references,
            0.0,
            0.0,
            true,
        )
        .unwrap();

        assert!((hs.adjusted_buffer.unwrap() - 40.0).abs() < 1e-9);
        assert_eq!(hs.info(), HeatingInfo::Charge);
        assert!((hs.demand().energy() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn same_decision_twice_from_one_snapshot() {
        let now = DateTime::now();
        let store = FakeStore::new(now);
        snapshot_with(20.0, 21.0, &store);
        let snapshot = Snapshot::new(&store, now);
        let house = test_house();
        let room = livingroom(&house);

        let rs = room_state(20.0, 120.0);
        let first = room_demand(&snapshot, room, &rs, &HashMap::new(), 0.0, 0.0, true).unwrap();
        let second = room_demand(&snapshot, room, &rs, &HashMap::new(), 0.0, 0.0, true).unwrap();

        assert_eq!(first.info(), second.info());
        assert_eq!(first.demand(), second.demand());
        assert_eq!(first.lazy_reduction, second.lazy_reduction);
    }
}
