use anyhow::Result;

use crate::core::time::{DateTime, Duration};
use crate::home::items::Item;

/// Synchronous access to a last-known-value store. Reads never block on I/O
/// beyond the store itself; the engine performs no network calls.
pub trait ValueStore {
    /// Latest known value of a numeric item.
    fn decimal(&self, item: &Item) -> Result<f64>;

    /// Latest known value of an on/off or open/closed item.
    fn switch(&self, item: &Item) -> Result<bool>;

    /// Value of a numeric item, filtered against short-lived spikes: the
    /// returned value has been unchanged for at least the trailing window.
    fn stable_decimal(&self, item: &Item, window: Duration, at: DateTime) -> Result<f64>;

    /// When the item last changed.
    fn last_updated(&self, item: &Item) -> Result<DateTime>;
}
