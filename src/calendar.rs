//! 360-day model calendar
//!
//! Climate-model archives in this pipeline use an idealised calendar of
//! twelve 30-day months. Instants are encoded as hours since 1970-01-01 in
//! that calendar, matching the `units`/`calendar` encoding of the source
//! files, so the type here is a thin wrapper around that hour count.

use crate::errors::{EtlError, Result};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;

/// Days per model year.
pub const DAYS_PER_YEAR: i64 = 360;

/// Days per model month.
pub const DAYS_PER_MONTH: i64 = 30;

/// Time axis units written to netCDF output.
pub const TIME_UNITS: &str = "hours since 1970-01-01";

/// Calendar name written to netCDF output.
pub const CALENDAR: &str = "360_day";

const EPOCH_YEAR: i64 = 1970;

/// An instant in the 360-day calendar, hour resolution.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CDateTime {
    hours: i64,
}

impl CDateTime {
    /// Build from calendar components. `month` is 1..=12, `day` 1..=30,
    /// `hour` 0..=23.
    pub fn from_ymdh(year: i64, month: u32, day: u32, hour: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(EtlError::BadDate(format!("month {} out of range", month)));
        }
        if !(1..=30).contains(&day) {
            return Err(EtlError::BadDate(format!("day {} out of range", day)));
        }
        if hour >= 24 {
            return Err(EtlError::BadDate(format!("hour {} out of range", hour)));
        }
        let days = (year - EPOCH_YEAR) * DAYS_PER_YEAR
            + i64::from(month - 1) * DAYS_PER_MONTH
            + i64::from(day - 1);
        Ok(CDateTime {
            hours: days * 24 + i64::from(hour),
        })
    }

    /// Build from a raw hours-since-epoch value.
    pub fn from_hours(hours: i64) -> Self {
        CDateTime { hours }
    }

    /// Build from a floating-point hours-since-epoch value as read from a
    /// netCDF time axis. Values are rounded to the nearest whole hour.
    pub fn from_f64_hours(hours: f64) -> Self {
        CDateTime {
            hours: hours.round() as i64,
        }
    }

    /// Hours since 1970-01-01 in the 360-day calendar.
    pub fn hours(self) -> i64 {
        self.hours
    }

    /// Hours since epoch as f64, for writing a netCDF time axis.
    pub fn as_f64_hours(self) -> f64 {
        self.hours as f64
    }

    /// Whole days since 1970-01-01.
    pub fn days(self) -> i64 {
        self.hours.div_euclid(24)
    }

    pub fn year(self) -> i64 {
        EPOCH_YEAR + self.days().div_euclid(DAYS_PER_YEAR)
    }

    /// Month of year, 1..=12.
    pub fn month(self) -> u32 {
        (self.days().rem_euclid(DAYS_PER_YEAR) / DAYS_PER_MONTH) as u32 + 1
    }

    /// Day of month, 1..=30.
    pub fn day(self) -> u32 {
        (self.days().rem_euclid(DAYS_PER_MONTH)) as u32 + 1
    }

    /// Hour of day, 0..=23.
    pub fn hour(self) -> u32 {
        self.hours.rem_euclid(24) as u32
    }

    /// Midnight at the start of this instant's day.
    pub fn floor_day(self) -> Self {
        CDateTime {
            hours: self.days() * 24,
        }
    }

    pub fn add_days(self, days: i64) -> Self {
        CDateTime {
            hours: self.hours + days * 24,
        }
    }

    pub fn season(self) -> Season {
        Season::from_month(self.month())
    }

    /// Meteorological year: December belongs to the following year, so a
    /// DJF winter is a single unit.
    pub fn met_year(self) -> i64 {
        if self.month() == 12 {
            self.year() + 1
        } else {
            self.year()
        }
    }

    /// Parse a `YYYY-MM-DD` date (midnight).
    pub fn parse_date(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 {
            return Err(EtlError::BadDate(format!("expected YYYY-MM-DD, got '{}'", s)));
        }
        let year: i64 = parts[0]
            .parse()
            .map_err(|_| EtlError::BadDate(format!("bad year in '{}'", s)))?;
        let month: u32 = parts[1]
            .parse()
            .map_err(|_| EtlError::BadDate(format!("bad month in '{}'", s)))?;
        let day: u32 = parts[2]
            .parse()
            .map_err(|_| EtlError::BadDate(format!("bad day in '{}'", s)))?;
        CDateTime::from_ymdh(year, month, day, 0)
    }
}

impl fmt::Display for CDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:00",
            self.year(),
            self.month(),
            self.day(),
            self.hour()
        )
    }
}

impl<'de> Deserialize<'de> for CDateTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CDateTime::parse_date(&s).map_err(de::Error::custom)
    }
}

impl Serialize for CDateTime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!(
            "{:04}-{:02}-{:02}",
            self.year(),
            self.month(),
            self.day()
        ))
    }
}

/// Meteorological season.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Season {
    Djf,
    Mam,
    Jja,
    Son,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Djf, Season::Mam, Season::Jja, Season::Son];

    pub fn from_month(month: u32) -> Self {
        match month % 12 / 3 {
            0 => Season::Djf,
            1 => Season::Mam,
            2 => Season::Jja,
            _ => Season::Son,
        }
    }

    /// Season index as stored in the `season` coordinate (DJF=0 .. SON=3).
    pub fn index(self) -> u8 {
        match self {
            Season::Djf => 0,
            Season::Mam => 1,
            Season::Jja => 2,
            Season::Son => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Season::Djf => "DJF",
            Season::Mam => "MAM",
            Season::Jja => "JJA",
            Season::Son => "SON",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_round_trip() {
        let t = CDateTime::from_ymdh(1980, 12, 1, 12).unwrap();
        assert_eq!(t.year(), 1980);
        assert_eq!(t.month(), 12);
        assert_eq!(t.day(), 1);
        assert_eq!(t.hour(), 12);

        let epoch = CDateTime::from_ymdh(1970, 1, 1, 0).unwrap();
        assert_eq!(epoch.hours(), 0);
    }

    #[test]
    fn pre_epoch_dates() {
        let t = CDateTime::from_ymdh(1960, 6, 15, 6).unwrap();
        assert_eq!(t.year(), 1960);
        assert_eq!(t.month(), 6);
        assert_eq!(t.day(), 15);
        assert_eq!(t.hour(), 6);
        assert!(t.hours() < 0);
    }

    #[test]
    fn day_arithmetic_crosses_boundaries() {
        let t = CDateTime::from_ymdh(1980, 12, 30, 0).unwrap();
        let next = t.add_days(1);
        assert_eq!(next.year(), 1981);
        assert_eq!(next.month(), 1);
        assert_eq!(next.day(), 1);

        let prev = t.add_days(-30);
        assert_eq!(prev.month(), 11);
        assert_eq!(prev.day(), 30);
    }

    #[test]
    fn floor_day_drops_hours() {
        let t = CDateTime::from_ymdh(1981, 3, 7, 23).unwrap();
        let floored = t.floor_day();
        assert_eq!(floored.hour(), 0);
        assert_eq!(floored.day(), 7);
        assert_eq!(t.floor_day(), CDateTime::from_ymdh(1981, 3, 7, 0).unwrap());
    }

    #[test]
    fn seasons_and_met_years() {
        let dec = CDateTime::from_ymdh(1980, 12, 5, 0).unwrap();
        assert_eq!(dec.season(), Season::Djf);
        assert_eq!(dec.met_year(), 1981);

        let jan = CDateTime::from_ymdh(1981, 1, 5, 0).unwrap();
        assert_eq!(jan.season(), Season::Djf);
        assert_eq!(jan.met_year(), 1981);

        assert_eq!(CDateTime::from_ymdh(1981, 4, 1, 0).unwrap().season(), Season::Mam);
        assert_eq!(CDateTime::from_ymdh(1981, 7, 1, 0).unwrap().season(), Season::Jja);
        assert_eq!(CDateTime::from_ymdh(1981, 10, 1, 0).unwrap().season(), Season::Son);
    }

    #[test]
    fn parse_and_display() {
        let t = CDateTime::parse_date("1980-12-01").unwrap();
        assert_eq!(t, CDateTime::from_ymdh(1980, 12, 1, 0).unwrap());
        assert_eq!(t.to_string(), "1980-12-01T00:00");

        assert!(CDateTime::parse_date("1980-13-01").is_err());
        assert!(CDateTime::parse_date("1980-02-31").is_err());
        assert!(CDateTime::parse_date("nonsense").is_err());
    }

    #[test]
    fn f64_round_trip() {
        let t = CDateTime::from_ymdh(2020, 12, 1, 12).unwrap();
        assert_eq!(CDateTime::from_f64_hours(t.as_f64_hours()), t);
    }
}
