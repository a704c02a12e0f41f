//! Acquisition dates of raster files.
//!
//! Time series of rasters are usually told apart only by their file names:
//! `ui_2023-06.tif` for a monthly product, `T33UUU_20241016T100029_B08.tif`
//! for a scene. [`date_from_name`] recovers the date and [`DateRange`] selects
//! a period of them.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{HotmapError, Result};

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Range from `start` to `end`, both included.
    ///
    /// # Errors
    ///
    /// [`HotmapError::InvalidDateRange`] if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(HotmapError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Every day of one calendar month, or `None` for an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Date embedded in a file name.
///
/// The first digit run that reads as a date wins. Recognised forms are
/// `YYYYMMDD` (also as the date part of `YYYYMMDDTHHMMSS`), `YYYY-MM-DD` and
/// `YYYY-MM`, the last one standing for the first day of the month. Runs of
/// other lengths, such as tile numbers, are skipped.
pub fn date_from_name(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    (0..bytes.len())
        .filter(|&i| bytes[i].is_ascii_digit() && (i == 0 || !bytes[i - 1].is_ascii_digit()))
        .find_map(|i| date_at(&name[i..]))
}

fn digit_run(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

fn date_at(s: &str) -> Option<NaiveDate> {
    match digit_run(s) {
        8 => NaiveDate::parse_from_str(&s[..8], "%Y%m%d").ok(),
        4 => {
            let year: i32 = s[..4].parse().ok()?;
            let rest = s[4..].strip_prefix('-')?;
            if digit_run(rest) != 2 {
                return None;
            }
            let month: u32 = rest[..2].parse().ok()?;
            let day = match rest[2..].strip_prefix('-') {
                Some(tail) if digit_run(tail) == 2 => tail[..2].parse().ok()?,
                _ => 1,
            };
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}
