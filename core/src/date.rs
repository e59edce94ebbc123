//! Calendar-date encoding.
//!
//! [`CalendarDate`] is the date scalar that follows the client's
//! [`DateFormat`]. It serializes as a newtype struct with a reserved name; the
//! codec's serializer and deserializer recognise that name and apply the
//! configured pattern. Outside the codec (plain `serde_json`) it reads and
//! writes ISO-8601 `YYYY-MM-DD`.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::error::RestError;

pub(crate) const CALENDAR_DATE_TOKEN: &str = "$rest_facade::private::CalendarDate";

const ISO_PATTERN: &str = "%Y-%m-%d";

/// Encoding rule for [`CalendarDate`] fields, applied to both directions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DateFormat {
    /// `YYYY-MM-DD`.
    #[default]
    Iso8601,
    /// A strftime pattern such as `%d/%m/%Y`.
    Pattern(String),
}

impl DateFormat {
    /// Validated custom pattern.
    pub fn custom(pattern: impl Into<String>) -> Result<Self, RestError> {
        let format = DateFormat::Pattern(pattern.into());
        format.validate()?;
        Ok(format)
    }

    pub fn pattern(&self) -> &str {
        match self {
            DateFormat::Iso8601 => ISO_PATTERN,
            DateFormat::Pattern(p) => p,
        }
    }

    /// Checks that the pattern parses and carries a full calendar date, by
    /// formatting a probe date and reading it back.
    pub(crate) fn validate(&self) -> Result<(), RestError> {
        let pattern = self.pattern();
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(RestError::configuration(format!(
                "invalid date pattern `{pattern}`"
            )));
        }
        let probe = NaiveDate::from_ymd_opt(2021, 11, 23)
            .ok_or_else(|| RestError::configuration("probe date out of range"))?;
        let text = self.format(probe).map_err(|_| {
            RestError::configuration(format!("date pattern `{pattern}` cannot format a calendar date"))
        })?;
        match self.parse(&text) {
            Ok(parsed) if parsed == probe => Ok(()),
            _ => Err(RestError::configuration(format!(
                "date pattern `{pattern}` does not round-trip a calendar date"
            ))),
        }
    }

    pub(crate) fn format(&self, date: NaiveDate) -> Result<String, fmt::Error> {
        // `to_string` would panic on items a date cannot render (e.g. `%H`).
        let mut out = String::new();
        write!(out, "{}", date.format(self.pattern()))?;
        Ok(out)
    }

    pub(crate) fn parse(&self, text: &str) -> Result<NaiveDate, chrono::ParseError> {
        NaiveDate::parse_from_str(text, self.pattern())
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFormat::Iso8601 => f.write_str("iso8601"),
            DateFormat::Pattern(p) => f.write_str(p),
        }
    }
}

impl FromStr for DateFormat {
    type Err = RestError;

    /// `iso8601` (or `iso`) selects ISO-8601; anything containing `%` is a
    /// strftime pattern.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iso8601" | "ISO_8601" | "iso" => Ok(DateFormat::Iso8601),
            p if p.contains('%') => DateFormat::custom(p),
            other => Err(RestError::configuration(format!(
                "unknown date format `{other}`"
            ))),
        }
    }
}

/// A calendar date encoded with the client's [`DateFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(pub NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(CalendarDate)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(date: NaiveDate) -> Self {
        CalendarDate(date)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ISO_PATTERN))
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(CALENDAR_DATE_TOKEN, &self.to_string())
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(CALENDAR_DATE_TOKEN, CalendarDateVisitor)
    }
}

struct CalendarDateVisitor;

impl<'de> Visitor<'de> for CalendarDateVisitor {
    type Value = CalendarDate;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a calendar date string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CalendarDate, E> {
        NaiveDate::parse_from_str(v, ISO_PATTERN)
            .map(CalendarDate)
            .map_err(|e| E::custom(format!("invalid date `{v}`: {e}")))
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, d: D) -> Result<CalendarDate, D::Error> {
        d.deserialize_str(self)
    }
}

/// Rewrites an ISO-8601 date into `format`.
pub(crate) fn iso_to_format(iso: &str, format: &DateFormat) -> Result<String, String> {
    let date = DateFormat::Iso8601
        .parse(iso)
        .map_err(|e| format!("invalid date `{iso}`: {e}"))?;
    format
        .format(date)
        .map_err(|_| format!("cannot format date with `{}`", format.pattern()))
}

/// Rewrites a date written in `format` into ISO-8601.
pub(crate) fn format_to_iso(text: &str, format: &DateFormat) -> Result<String, String> {
    let date = format.parse(text).map_err(|e| {
        format!("invalid date `{text}`, expected format `{}`: {e}", format.pattern())
    })?;
    Ok(date.format(ISO_PATTERN).to_string())
}
