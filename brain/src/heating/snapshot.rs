use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::Result;

use crate::core::time::{DateTime, Duration};
use crate::home::items::Item;
use crate::port::ValueStore;

/// Trailing window for spike-filtered temperature reads, minutes.
pub const STABLE_TEMPERATURE_MINUTES: i64 = 10;

/// Memoized sensor readings for one engine cycle. Built fresh per cycle and
/// discarded afterwards, so no read can leak into the next invocation.
///
/// Overrides shadow the raw store values; the forecast horizon driver uses
/// them to substitute forecast temperature and cloud cover, the stale-data
/// fallbacks to substitute safe defaults.
pub struct Snapshot<'a> {
    store: &'a dyn ValueStore,
    now: DateTime,
    decimals: RefCell<HashMap<Item, f64>>,
    switches: RefCell<HashMap<Item, bool>>,
    stables: RefCell<HashMap<(Item, i64), f64>>,
    older: RefCell<HashMap<(Item, i64), bool>>,
    overrides: RefCell<HashMap<Item, f64>>,
}

impl<'a> Snapshot<'a> {
    pub fn new(store: &'a dyn ValueStore, now: DateTime) -> Self {
        Self {
            store,
            now,
            decimals: RefCell::new(HashMap::new()),
            switches: RefCell::new(HashMap::new()),
            stables: RefCell::new(HashMap::new()),
            older: RefCell::new(HashMap::new()),
            overrides: RefCell::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime {
        self.now
    }

    /// Shadow an item with a substituted value for the remainder of the cycle
    /// (or until replaced). Affects plain and stabilized reads.
    pub fn set_override(&self, item: Item, value: f64) {
        self.overrides.borrow_mut().insert(item, value);
    }

    pub fn decimal(&self, item: &Item) -> Result<f64> {
        if let Some(value) = self.overrides.borrow().get(item) {
            return Ok(*value);
        }
        if let Some(value) = self.decimals.borrow().get(item) {
            return Ok(*value);
        }
        let value = self.store.decimal(item)?;
        self.decimals.borrow_mut().insert(item.clone(), value);
        Ok(value)
    }

    pub fn switch(&self, item: &Item) -> Result<bool> {
        if let Some(value) = self.switches.borrow().get(item) {
            return Ok(*value);
        }
        let value = self.store.switch(item)?;
        self.switches.borrow_mut().insert(item.clone(), value);
        Ok(value)
    }

    /// Spike-filtered reading, unchanged for at least `stable_minutes`.
    pub fn stable(&self, item: &Item, stable_minutes: i64) -> Result<f64> {
        if let Some(value) = self.overrides.borrow().get(item) {
            return Ok(*value);
        }
        if let Some(value) = self.stables.borrow().get(&(item.clone(), stable_minutes)) {
            return Ok(*value);
        }
        let value = self
            .store
            .stable_decimal(item, Duration::minutes(stable_minutes), self.now)?;
        self.stables
            .borrow_mut()
            .insert((item.clone(), stable_minutes), value);
        Ok(value)
    }

    pub fn last_updated(&self, item: &Item) -> Result<DateTime> {
        self.store.last_updated(item)
    }

    /// Whether the item last changed more than `minutes` ago.
    pub fn update_older_than(&self, item: &Item, minutes: i64) -> Result<bool> {
        if let Some(value) = self.older.borrow().get(&(item.clone(), minutes)) {
            return Ok(*value);
        }
        let last_updated = self.store.last_updated(item)?;
        let value = self.now.elapsed_since(last_updated) > Duration::minutes(minutes);
        self.older
            .borrow_mut()
            .insert((item.clone(), minutes), value);
        Ok(value)
    }
}
