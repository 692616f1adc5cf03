//! Fixed in-world calendar: 30-day months, 12-month years.
//!
//! The engine never schedules against wall-clock time; mission durations are
//! pure integer day arithmetic over this representation, and callers supply
//! "now" from whatever calendar source they run against.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const DAYS_PER_MONTH: i64 = 30;
pub const MONTHS_PER_YEAR: i64 = 12;
pub const DAYS_PER_YEAR: i64 = DAYS_PER_MONTH * MONTHS_PER_YEAR;

/// A single in-world date. `day` runs 1..=30, `month` runs 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildDate {
    pub day: u8,
    pub month: u8,
    pub year: i32,
}

impl GuildDate {
    /// Build a date, rejecting out-of-range day or month components.
    #[must_use]
    pub const fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        if day == 0 || day as i64 > DAYS_PER_MONTH || month == 0 || month as i64 > MONTHS_PER_YEAR {
            return None;
        }
        Some(Self { day, month, year })
    }

    /// Total days elapsed since day 1, month 1 of year 0.
    #[must_use]
    pub const fn in_days(self) -> i64 {
        self.year as i64 * DAYS_PER_YEAR
            + (self.month as i64 - 1) * DAYS_PER_MONTH
            + (self.day as i64 - 1)
    }

    /// Inverse of [`Self::in_days`].
    #[must_use]
    pub const fn from_days(days: i64) -> Self {
        let year = days.div_euclid(DAYS_PER_YEAR);
        let remainder = days.rem_euclid(DAYS_PER_YEAR);
        let month = remainder.div_euclid(DAYS_PER_MONTH);
        let day = remainder.rem_euclid(DAYS_PER_MONTH);
        Self {
            day: (day + 1) as u8,
            month: (month + 1) as u8,
            year: year as i32,
        }
    }

    /// Date offset by a signed number of days.
    #[must_use]
    pub const fn add_days(self, days: i64) -> Self {
        Self::from_days(self.in_days() + days)
    }

    /// Signed day count from `self` to `other` (positive when `other` is later).
    #[must_use]
    pub const fn days_until(self, other: Self) -> i64 {
        other.in_days() - self.in_days()
    }
}

impl Ord for GuildDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.in_days().cmp(&other.in_days())
    }
}

impl PartialOrd for GuildDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GuildDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}.{:02}.{:04}",
            self.day, self.month, self.year
        )
    }
}
