//! Calendar date keys (`YYYY-MM-DD`) in the user's local time zone.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Date key of a local wall-clock timestamp.
    pub fn of(now: NaiveDateTime) -> Self {
        Self(now.date())
    }

    /// Accepts `YYYY-MM-DD` and anything that starts with it (ISO timestamps).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let head = raw.get(..10)?;
        NaiveDate::parse_from_str(head, FORMAT).ok().map(Self)
    }

    /// Whole calendar days from `self` to `later`; negative if `later` is earlier.
    pub fn days_until(self, later: DateKey) -> i64 {
        (later.0 - self.0).num_days()
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateKey::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date key '{raw}'")))
    }
}
