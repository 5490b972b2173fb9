use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::time::{DateTime, Duration};
use crate::home::items::Item;
use crate::port::ValueStore;

/// History samples older than this are dropped; the longest stabilized read
/// the engine asks for is 20 minutes.
const HISTORY_RETENTION_HOURS: i64 = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Switch(bool),
    Decimal(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistorySample {
    at: DateTime,
    value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: StoredValue,
    /// Time of the last value change, not of the last report.
    updated: DateTime,
    #[serde(default)]
    history: Vec<HistorySample>,
}

/// Last-known-value store backed by a single JSON file, keyed by the item's
/// display name. Decimal items additionally keep a short history for the
/// stabilized reads.
pub struct FileStore {
    path: PathBuf,
    entries: RefCell<HashMap<String, Entry>>,
}

impl FileStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading value store {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing value store {}", path.display()))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    /// Records a new decimal reading. Values outside the item's plausible
    /// range are dropped with a warning and the previous value survives.
    pub fn update_decimal(&self, item: &Item, value: f64, now: DateTime) -> Result<()> {
        if let Some((min, max)) = plausible_range(item) {
            if !(min..=max).contains(&value) {
                tracing::warn!(
                    "Ignoring implausible value {value} for {item}, expected {min}..{max}"
                );
                return Ok(());
            }
        }

        {
            let mut entries = self.entries.borrow_mut();
            let entry = entries.entry(item.to_string()).or_insert_with(|| Entry {
                value: StoredValue::Decimal(value),
                updated: now,
                history: Vec::new(),
            });

            let changed = !matches!(entry.value, StoredValue::Decimal(previous) if previous == value);
            entry.value = StoredValue::Decimal(value);
            if changed {
                entry.updated = now;
            }

            entry.history.push(HistorySample { at: now, value });
            let horizon = now - Duration::hours(HISTORY_RETENTION_HOURS);
            entry.history.retain(|sample| sample.at >= horizon);
        }

        self.persist()
    }

    pub fn update_switch(&self, item: &Item, value: bool, now: DateTime) -> Result<()> {
        {
            let mut entries = self.entries.borrow_mut();
            let entry = entries.entry(item.to_string()).or_insert_with(|| Entry {
                value: StoredValue::Switch(value),
                updated: now,
                history: Vec::new(),
            });

            let changed = !matches!(entry.value, StoredValue::Switch(previous) if previous == value);
            entry.value = StoredValue::Switch(value);
            if changed {
                entry.updated = now;
            }
        }

        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&*self.entries.borrow())?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw)
            .with_context(|| format!("writing value store {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing value store {}", self.path.display()))?;

        Ok(())
    }
}

impl ValueStore for FileStore {
    fn decimal(&self, item: &Item) -> Result<f64> {
        let entries = self.entries.borrow();
        let entry = entries
            .get(&item.to_string())
            .ok_or_else(|| anyhow!("no value for {item}"))?;

        match entry.value {
            StoredValue::Decimal(value) => Ok(value),
            StoredValue::Switch(_) => bail!("{item} is a switch, not a decimal"),
        }
    }

    fn switch(&self, item: &Item) -> Result<bool> {
        let entries = self.entries.borrow();
        let entry = entries
            .get(&item.to_string())
            .ok_or_else(|| anyhow!("no value for {item}"))?;

        match entry.value {
            StoredValue::Switch(value) => Ok(value),
            StoredValue::Decimal(_) => bail!("{item} is a decimal, not a switch"),
        }
    }

    /// Time-weighted average over the trailing window, so a single spiky
    /// report cannot swing the energy balance.
    fn stable_decimal(&self, item: &Item, window: Duration, at: DateTime) -> Result<f64> {
        let current = self.decimal(item)?;

        let entries = self.entries.borrow();
        let entry = entries
            .get(&item.to_string())
            .ok_or_else(|| anyhow!("no value for {item}"))?;

        let start = at - window;
        let mut weighted = 0.0;
        let mut total = 0.0;
        let mut previous: Option<(DateTime, f64)> = None;

        for sample in &entry.history {
            if sample.at <= start {
                previous = Some((start, sample.value));
                continue;
            }
            if sample.at >= at {
                break;
            }
            if let Some((from, value)) = previous {
                let secs = sample.at.elapsed_since(from).as_secs_f64();
                weighted += value * secs;
                total += secs;
            }
            previous = Some((sample.at, sample.value));
        }
        if let Some((from, value)) = previous {
            let secs = at.elapsed_since(from).as_secs_f64();
            if secs > 0.0 {
                weighted += value * secs;
                total += secs;
            }
        }

        if total > 0.0 {
            Ok(weighted / total)
        } else {
            Ok(current)
        }
    }

    fn last_updated(&self, item: &Item) -> Result<DateTime> {
        let entries = self.entries.borrow();
        entries
            .get(&item.to_string())
            .map(|entry| entry.updated)
            .ok_or_else(|| anyhow!("no value for {item}"))
    }
}

fn plausible_range(item: &Item) -> Option<(f64, f64)> {
    match item {
        Item::Temperature(_)
        | Item::TargetTemperature(_)
        | Item::OutdoorTemperature
        | Item::OutdoorTemperatureForecast4
        | Item::OutdoorTemperatureForecast8
        | Item::VentilationOutgoingTemperature
        | Item::VentilationIncomingTemperature
        | Item::HeatingPipeOutTemperature
        | Item::HeatingPipeInTemperature => Some((-50.0, 100.0)),
        Item::CloudCover | Item::CloudCoverForecast4 | Item::CloudCoverForecast8 => {
            Some((0.0, 9.0))
        }
        Item::HeatingPumpSpeed | Item::VentilationLevel | Item::ShutterPosition(_) => {
            Some((0.0, 100.0))
        }
        _ => None,
    }
}
