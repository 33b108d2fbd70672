use std::sync::Mutex;

use chrono::{Days, NaiveDateTime};
use ritual_core::DateKey;

/// Local wall-clock time. Calendar logic only ever sees local dates.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> DateKey {
        DateKey::of(self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Settable clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Parse `YYYY-MM-DD HH:MM`; falls back to the Unix epoch on bad input.
    pub fn at(raw: &str) -> Self {
        let now = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").unwrap_or_default();
        Self::new(now)
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance_days(&self, days: u64) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(later) = now.checked_add_days(Days::new(days)) {
            *now = later;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
