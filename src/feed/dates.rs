//! Publish-date normalization for feed entries.
//!
//! Feeds in the wild disagree on timestamp syntax. [`normalize_date`] tries a
//! fixed, ordered list of [`Layout`]s and returns the instant produced by the
//! first one that consumes the whole string.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// A raw date string that none of the known layouts accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateFormatError {
    #[error("unsupported date format: {0:?}")]
    Unsupported(String),
}

/// A timestamp layout accepted by [`normalize_date`].
///
/// Layouts ending in a zone name (`GMT`, `EST`, ...) resolve the name through
/// [`zone_offset`]; the others carry a numeric offset (`-0700`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Numeric,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123Named,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Numeric,
    /// `02 Jan 06 15:04 MST`
    Rfc822Named,
    /// `2006-01-02T15:04:05Z07:00`, fractional seconds allowed
    Rfc3339,
    /// `02 Jan 2006 15:04:05 -0700`: RFC 1123 for feeds that drop the weekday.
    NoWeekdayNumeric,
    /// `02 Jan 2006 15:04:05 MST`: same, with a zone name.
    NoWeekdayNamed,
}

/// Tried in this order. Order only matters for strings more than one layout accepts.
pub const LAYOUTS: [Layout; 7] = [
    Layout::Rfc1123Numeric,
    Layout::Rfc1123Named,
    Layout::Rfc822Numeric,
    Layout::Rfc822Named,
    Layout::Rfc3339,
    Layout::NoWeekdayNumeric,
    Layout::NoWeekdayNamed,
];

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Strip a leading `Mon, ` prefix.
///
/// The name only has to be a weekday; whether it matches the date is not
/// checked, since feeds often get it wrong.
fn strip_weekday(raw: &str) -> Option<&str> {
    let (day, rest) = raw.split_once(", ")?;
    WEEKDAYS
        .iter()
        .any(|name| name.eq_ignore_ascii_case(day))
        .then_some(rest)
}

impl Layout {
    /// chrono format string, as a feed would render it. For named layouts
    /// this excludes the trailing zone.
    pub fn pattern(self) -> &'static str {
        match self {
            Layout::Rfc1123Numeric => "%a, %d %b %Y %H:%M:%S %z",
            Layout::Rfc1123Named => "%a, %d %b %Y %H:%M:%S",
            Layout::Rfc822Numeric => "%d %b %y %H:%M %z",
            Layout::Rfc822Named => "%d %b %y %H:%M",
            Layout::Rfc3339 => "%Y-%m-%dT%H:%M:%S%.f%:z",
            Layout::NoWeekdayNumeric => "%d %b %Y %H:%M:%S %z",
            Layout::NoWeekdayNamed => "%d %b %Y %H:%M:%S",
        }
    }

    fn has_zone_name(self) -> bool {
        matches!(
            self,
            Layout::Rfc1123Named | Layout::Rfc822Named | Layout::NoWeekdayNamed
        )
    }

    /// Parse `raw` with this layout only. The whole string must match.
    pub fn parse(self, raw: &str) -> Option<DateTime<FixedOffset>> {
        match self {
            Layout::Rfc3339 => return DateTime::parse_from_rfc3339(raw).ok(),
            Layout::Rfc1123Numeric => {
                return Layout::NoWeekdayNumeric.parse(strip_weekday(raw)?);
            }
            Layout::Rfc1123Named => return Layout::NoWeekdayNamed.parse(strip_weekday(raw)?),
            _ => {}
        }

        if !self.has_zone_name() {
            return DateTime::parse_from_str(raw, self.pattern()).ok();
        }

        let (local, zone) = raw.rsplit_once(char::is_whitespace)?;
        let offset = zone_offset(zone)?;
        let naive = NaiveDateTime::parse_from_str(local.trim_end(), self.pattern()).ok()?;
        offset.from_local_datetime(&naive).single()
    }
}

/// Resolve a zone name to a fixed offset.
///
/// Covers the RFC 822 zones. Any other 3-5 letter upper-case abbreviation is
/// accepted as UTC, since its real offset cannot be known from the name alone.
pub fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ if (3..=5).contains(&zone.len()) && zone.bytes().all(|b| b.is_ascii_uppercase()) => {
            tracing::debug!(zone = %zone, "Unknown zone abbreviation, assuming UTC");
            0
        }
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

/// Parse a feed entry's publish date into a UTC instant.
///
/// Surrounding whitespace is ignored. Returns
/// [`DateFormatError::Unsupported`] carrying the original string when no
/// layout in [`LAYOUTS`] matches.
pub fn normalize_date(raw: &str) -> Result<DateTime<Utc>, DateFormatError> {
    let trimmed = raw.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| DateFormatError::Unsupported(raw.to_string()))
}
