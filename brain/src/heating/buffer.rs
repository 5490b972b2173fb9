use std::collections::HashMap;

use anyhow::Result;

use crate::home::items::Item;

use super::snapshot::Snapshot;
use super::state::RoomState;

/// Assumed elapsed time for the first cycle after a restart, seconds.
pub const FIRST_CYCLE_SECONDS: f64 = 30.0;

/// Window for the reference temperature; longer than the per-cycle reads so a
/// slow drift registers as a step instead of noise.
const REFERENCE_STABLE_MINUTES: i64 = 20;

/// Result of one charge-tracking step.
pub struct ChargeUpdate {
    /// New charge level, Wh, never negative.
    pub charge: f64,
    /// Energy booked out because the room temperature rose; a forced-heating
    /// latch target has to come down by the same amount.
    pub adjustment: f64,
}

/// Integrates the active saldo into the room's charge level and reconciles it
/// against the observed room temperature: when the stabilized temperature
/// rises a notch, part of the buffered energy has evidently arrived in the
/// room air and is deducted from the charge.
pub fn charge_level(
    snapshot: &Snapshot,
    room_name: &str,
    state: &RoomState,
    references: &mut HashMap<String, f64>,
    elapsed_seconds: f64,
) -> Result<ChargeUpdate> {
    let mut charge = snapshot.decimal(&Item::ChargedBuffer(room_name.to_owned()))?;
    let mut adjustment = 0.0;

    let current = round1(snapshot.stable(
        &Item::Temperature(room_name.to_owned()),
        REFERENCE_STABLE_MINUTES,
    )?);

    match references.get(room_name).copied() {
        Some(reference) if current > reference => {
            if charge > 0.0 {
                let adjusted = (charge - state.buffer_capacity * (current - reference)).max(0.0);
                adjustment = charge - adjusted;
                tracing::info!(
                    "Cleanup charged energy of room {}. {:.1} => {:.1} ({:.1} °C => {:.1} °C)",
                    room_name,
                    charge,
                    adjusted,
                    reference,
                    current
                );
                charge = adjusted;
            } else {
                tracing::info!(
                    "Temperature of room {} increased. {:.1} °C => {:.1} °C",
                    room_name,
                    reference,
                    current
                );
            }
        }
        Some(reference) if current < reference => {
            tracing::info!(
                "Temperature of room {} decreased. {:.1} °C => {:.1} °C",
                room_name,
                reference,
                current
            );
        }
        _ => {}
    }
    references.insert(room_name.to_owned(), current);

    charge += state.active_saldo() * elapsed_seconds / 3600.0;

    Ok(ChargeUpdate {
        charge: charge.max(0.0),
        adjustment,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
