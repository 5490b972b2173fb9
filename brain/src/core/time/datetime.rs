use std::{
    fmt::Display,
    ops::{Add, Sub},
};

use chrono::{Datelike, Timelike};

use super::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DateTime {
    delegate: chrono::DateTime<chrono::Local>,
}

impl DateTime {
    fn new<T: chrono::TimeZone>(delegate: chrono::DateTime<T>) -> Self {
        Self {
            delegate: delegate.with_timezone(&chrono::Local),
        }
    }

    pub fn now() -> Self {
        Self::new(chrono::Local::now())
    }

    pub fn from_iso(iso8601: &str) -> anyhow::Result<Self> {
        Ok(Self::new(chrono::DateTime::parse_from_rfc3339(iso8601)?))
    }

    /// Wall-clock timestamp in the system time zone.
    pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> anyhow::Result<Self> {
        use chrono::TimeZone;

        chrono::Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .map(Self::new)
            .ok_or_else(|| {
                anyhow::anyhow!("invalid local timestamp {year}-{month:02}-{day:02} {hour:02}:{minute:02}")
            })
    }

    pub fn to_iso_string(&self) -> String {
        self.delegate.to_rfc3339()
    }

    pub fn hour(&self) -> u32 {
        self.delegate.hour()
    }

    pub fn minute(&self) -> u32 {
        self.delegate.minute()
    }

    /// Monday = 1 .. Sunday = 7
    pub fn weekday_number(&self) -> u32 {
        self.delegate.weekday().number_from_monday()
    }

    pub fn on_same_day_as(&self, other: &DateTime) -> bool {
        self.delegate.date_naive() == other.delegate.date_naive()
    }

    /// Date and fractional hour in UTC, as needed by the solar position model.
    pub fn to_utc_date_hour(&self) -> (i32, u32, u32, f64) {
        let utc = self.delegate.with_timezone(&chrono::Utc);
        let hour = utc.hour() as f64 + utc.minute() as f64 / 60.0 + utc.second() as f64 / 3600.0;
        (utc.year(), utc.month(), utc.day(), hour)
    }

    pub fn elapsed_since(&self, since: Self) -> Duration {
        Duration::new(self.delegate - since.delegate)
    }
}

impl Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.delegate)
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate + rhs.delegate())
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self::new(self.delegate - rhs.delegate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_starts_with_monday() {
        // 2024-01-02 is a Tuesday
        let dt = DateTime::local(2024, 1, 2, 4, 59).unwrap();
        assert_eq!(dt.weekday_number(), 2);
    }

    #[test]
    fn adding_minutes_crosses_the_hour() {
        let dt = DateTime::local(2024, 1, 2, 21, 30).unwrap();
        let later = dt + Duration::minutes(90);
        assert_eq!(later.hour(), 23);
        assert_eq!(later.minute(), 0);
    }
}
