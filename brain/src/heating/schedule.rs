use crate::core::time::{DateTime, Duration};

/// Target temperature reduction while night mode is active, Kelvin.
pub const NIGHT_REDUCTION: f64 = 2.0;

/// Heating demands shorter than this are not worth firing the burner for.
pub const MIN_HEATING_TIME_MINUTES: i64 = 15;

/// Night mode is entered this long before the night window actually starts,
/// so rooms stop charging in time.
const NIGHT_LOOKAHEAD_MINUTES: i64 = 90;

/// Cold-floor heating needs at least this much rest since the last run.
const COLD_FLOOR_REST_MINUTES: i64 = 180;

/// Whether the given wall-clock time falls into the night window.
///
/// Mornings end at 5 h before working days and at 8 h otherwise; evenings
/// start at 22 h except before Saturdays and Sundays, where there is no
/// evening night window at all.
pub fn is_night_time(at: DateTime, holiday: bool) -> bool {
    let day = at.weekday_number();
    let hour = at.hour();

    if hour < 12 {
        let end = if !holiday && day <= 5 { 5 } else { 8 };
        hour < end
    } else {
        let has_evening_window = (!holiday && day <= 4) || day == 7;
        has_evening_window && hour >= 22
    }
}

/// Whether the engine should apply the night reduction right now.
///
/// In the evening the decision looks ahead: charging a room takes a while, so
/// the reduction kicks in 90 minutes early, plus the minimum burner runtime
/// when the heating is currently off.
pub fn is_night_mode(now: DateTime, holiday: bool, heating_active: bool) -> bool {
    let hour = now.hour();

    if hour > 19 {
        let mut lookahead = NIGHT_LOOKAHEAD_MINUTES;
        if !heating_active {
            lookahead += MIN_HEATING_TIME_MINUTES;
        }
        is_night_time(now + Duration::minutes(lookahead), holiday)
    } else if hour < 10 {
        is_night_time(now, holiday)
    } else {
        false
    }
}

/// Whether a cold-floor run is due: once in the morning while night mode is
/// still active, once in the late afternoon, and never twice within 3 hours.
pub fn possible_cold_floor_heating(
    now: DateTime,
    holiday: bool,
    night_mode_active: bool,
    last_change: DateTime,
) -> bool {
    if now.elapsed_since(last_change) < Duration::minutes(COLD_FLOOR_REST_MINUTES) {
        return false;
    }

    let day = now.weekday_number();
    let hour = now.hour();
    let changed_today = last_change.on_same_day_as(&now);

    let is_morning = hour < 12 && night_mode_active;
    let had_morning = changed_today;

    let min_evening_hour = if holiday || day >= 6 { 16 } else { 17 };
    let is_evening = hour >= min_evening_hour;
    let had_evening = changed_today && last_change.hour() >= min_evening_hour;

    (is_morning && !had_morning) || (is_evening && !had_evening)
}

/// How long a cold-floor run should be, in hours. Ramps up with the idle time
/// since the last run and saturates after 10 hours; mornings get up to 90
/// minutes, afternoons up to 45.
pub fn cold_floor_heating_time(now: DateTime, last_change: DateTime) -> f64 {
    let idle_minutes = now.elapsed_since(last_change).as_minutes_f64();

    let factor = (idle_minutes / 60.0 / 10.0).min(1.0);
    let multiplier = 1.0 - (factor - 1.0) * (factor - 1.0);

    let max_minutes = if now.hour() < 12 { 90.0 } else { 45.0 };

    max_minutes * multiplier / 60.0
}
