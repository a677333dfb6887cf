//! Target dates and the localized date marker embedded in generated reports.
//!
//! A `TargetDate` is always in canonical `YYYY-MM-DD` form. Validation has two
//! strictness levels: `Shape` accepts anything matching the 4-2-2 digit
//! pattern (so `2025-13-40` is accepted), `Calendar` additionally requires a
//! real calendar day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from date validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("date must be in YYYY-MM-DD form, got '{0}'")]
    InvalidFormat(String),

    #[error("'{0}' is not a calendar date")]
    NotACalendarDate(String),
}

/// How strictly a date string is validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStrictness {
    /// Digit shape only: `^\d{4}-\d{2}-\d{2}$`.
    #[default]
    Shape,
    /// Digit shape plus calendar validity.
    Calendar,
}

/// The calendar date a report run is generated for.
///
/// Ordering is by (year, month, day), which matches the lexicographic order of
/// the canonical text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetDate {
    year: u16,
    month: u8,
    day: u8,
}

impl TargetDate {
    /// Parse with shape-only validation.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        Self::parse_with(s, DateStrictness::Shape)
    }

    /// Parse with the given strictness.
    pub fn parse_with(s: &str, strictness: DateStrictness) -> Result<Self, DateError> {
        if !has_date_shape(s) {
            return Err(DateError::InvalidFormat(s.to_string()));
        }
        let b = s.as_bytes();
        let year = digits(&b[0..4]) as u16;
        let month = digits(&b[5..7]) as u8;
        let day = digits(&b[8..10]) as u8;
        let date = Self { year, month, day };

        if strictness == DateStrictness::Calendar && date.to_naive().is_none() {
            return Err(DateError::NotACalendarDate(s.to_string()));
        }
        Ok(date)
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    /// Compact `YYYYMMDD` form used for archive object names.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    /// The chrono date, if this is a real calendar day.
    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
    }

    pub fn is_calendar_valid(&self) -> bool {
        self.to_naive().is_some()
    }
}

impl fmt::Display for TargetDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for TargetDate {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetDate {
    type Error = DateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetDate> for String {
    fn from(date: TargetDate) -> Self {
        date.to_string()
    }
}

impl From<NaiveDate> for TargetDate {
    fn from(d: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: d.year().clamp(0, 9999) as u16,
            month: d.month() as u8,
            day: d.day() as u8,
        }
    }
}

/// True when `s` matches `^\d{4}-\d{2}-\d{2}$` exactly (ASCII digits only).
pub fn has_date_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}

fn digits(b: &[u8]) -> u32 {
    b.iter().fold(0, |acc, c| acc * 10 + (c - b'0') as u32)
}

/// Human-readable date marker that a generated report must contain.
///
/// Placeholders: `{year}`, `{month}` and `{day}`; month and day render
/// zero-padded to two digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateMarker {
    template: String,
}

pub const DEFAULT_MARKER_TEMPLATE: &str = "現在のデータ: {year}年{month}月{day}日";

impl DateMarker {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn render(&self, date: &TargetDate) -> String {
        self.template
            .replace("{year}", &date.year().to_string())
            .replace("{month}", &format!("{:02}", date.month()))
            .replace("{day}", &format!("{:02}", date.day()))
    }

    pub fn is_present_in(&self, content: &str, date: &TargetDate) -> bool {
        content.contains(&self.render(date))
    }
}

impl Default for DateMarker {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_TEMPLATE)
    }
}
