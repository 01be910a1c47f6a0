//! Time handling shared by every record
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Returns `None` when the fields do not name a single instant.
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }
    // stored form, full precision so a round trip compares equal
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
    pub fn parse_rfc3339(text: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(text).map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl<T: TimeZone> PartialOrd for TimeStamp<T>
where
    Self: Eq,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T>
where
    Self: Eq,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl serde::Serialize for TimeStamp<Utc> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trip_keeps_precision() {
        let original = TimeStamp::new();

        let decoded = TimeStamp::parse_rfc3339(&original.to_rfc3339()).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn plus_days_moves_forward() {
        let start = TimeStamp::new_with(2025, 3, 1, 9, 0, 0).unwrap();
        let later = start.plus_days(30);

        assert_eq!(later, TimeStamp::new_with(2025, 3, 31, 9, 0, 0).unwrap());
    }

    #[test]
    fn impossible_dates_are_rejected() {
        assert!(TimeStamp::new_with(2025, 2, 30, 0, 0, 0).is_none());
    }
}
