use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::core::time::{DateTime, Duration};
use crate::home::geometry::{
    ConstructionType, House, HouseConfig, Orientation, RoomConfig, TransitionConfig,
    TransitionKind, WallConfig,
};
use crate::home::items::Item;
use crate::port::ValueStore;

use super::solar::Location;

/// In-memory stand-in for the last-known-value store. Values default to
/// "freshly updated"; tests age individual items explicitly.
pub struct FakeStore {
    now: DateTime,
    decimals: RefCell<HashMap<Item, f64>>,
    switches: RefCell<HashMap<Item, bool>>,
    stables: RefCell<HashMap<Item, f64>>,
    updated: RefCell<HashMap<Item, DateTime>>,
}

impl FakeStore {
    pub fn new(now: DateTime) -> Self {
        Self {
            now,
            decimals: RefCell::new(HashMap::new()),
            switches: RefCell::new(HashMap::new()),
            stables: RefCell::new(HashMap::new()),
            updated: RefCell::new(HashMap::new()),
        }
    }

    pub fn set_decimal(&self, item: Item, value: f64) {
        self.decimals.borrow_mut().insert(item, value);
    }

    /// Lets a stabilized read diverge from the plain one, as it would after a
    /// recent spike.
    pub fn set_stable_decimal(&self, item: Item, value: f64) {
        self.stables.borrow_mut().insert(item, value);
    }

    pub fn set_switch(&self, item: Item, value: bool) {
        self.switches.borrow_mut().insert(item, value);
    }

    pub fn set_updated(&self, item: Item, at: DateTime) {
        self.updated.borrow_mut().insert(item, at);
    }
}

impl ValueStore for FakeStore {
    fn decimal(&self, item: &Item) -> Result<f64> {
        self.decimals
            .borrow()
            .get(item)
            .copied()
            .ok_or_else(|| anyhow!("no value for {item}"))
    }

    fn switch(&self, item: &Item) -> Result<bool> {
        Ok(self.switches.borrow().get(item).copied().unwrap_or(false))
    }

    fn stable_decimal(&self, item: &Item, _window: Duration, _at: DateTime) -> Result<f64> {
        if let Some(value) = self.stables.borrow().get(item) {
            return Ok(*value);
        }
        self.decimal(item)
    }

    fn last_updated(&self, item: &Item) -> Result<DateTime> {
        Ok(self.updated.borrow().get(item).copied().unwrap_or(self.now))
    }
}

/// Two-room fixture: a living room with a plain 10 m² exterior wall (U = 0.3)
/// and a contact-monitored window without conductive exchange, and a bathroom
/// with an interior wall bound to the living room and a south-facing window.
pub fn test_house() -> House {
    let mut construction_types = HashMap::new();
    construction_types.insert(
        "outer_wall".to_owned(),
        ConstructionType {
            u_value: Some(0.3),
            u_offset: 0.0,
            capacity: 300.0,
            factor: 1.0,
        },
    );
    construction_types.insert(
        "inner_wall".to_owned(),
        ConstructionType {
            u_value: Some(1.0),
            u_offset: 0.0,
            capacity: 150.0,
            factor: 1.0,
        },
    );
    construction_types.insert(
        "glass".to_owned(),
        ConstructionType {
            u_value: None,
            u_offset: 0.0,
            capacity: 0.0,
            factor: 1.0,
        },
    );

    let config = HouseConfig {
        construction_types,
        rooms: vec![
            RoomConfig {
                name: "livingroom".to_owned(),
                volume: 60.0,
                heating_volume: Some(20.0),
                walls: vec![WallConfig {
                    area: 10.0,
                    construction: "outer_wall".to_owned(),
                    orientation: Orientation::Other,
                    bound: None,
                }],
                transitions: vec![TransitionConfig {
                    kind: TransitionKind::Window,
                    area: 2.0,
                    construction: "glass".to_owned(),
                    orientation: Orientation::South,
                    bound: None,
                    contact: Some("livingroom".to_owned()),
                    shutter: None,
                    radiation_area: None,
                }],
            },
            RoomConfig {
                name: "bathroom".to_owned(),
                volume: 40.0,
                heating_volume: Some(10.0),
                walls: vec![
                    WallConfig {
                        area: 8.0,
                        construction: "outer_wall".to_owned(),
                        orientation: Orientation::South,
                        bound: None,
                    },
                    WallConfig {
                        area: 6.0,
                        construction: "inner_wall".to_owned(),
                        orientation: Orientation::Other,
                        bound: Some("livingroom".to_owned()),
                    },
                ],
                transitions: vec![TransitionConfig {
                    kind: TransitionKind::Window,
                    area: 1.0,
                    construction: "glass".to_owned(),
                    orientation: Orientation::South,
                    bound: None,
                    contact: None,
                    shutter: None,
                    radiation_area: Some(0.8),
                }],
            },
        ],
    };

    House::new(&config).expect("test geometry is valid")
}

pub fn test_location() -> Location {
    Location {
        latitude: 52.52,
        longitude: 13.41,
    }
}
