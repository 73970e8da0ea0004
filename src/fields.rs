//! Field-level parsers shared by the deed and taxroll validators.

use chrono::NaiveDate;

/// Why a parcel identifier could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnError {
    /// Both the formatted and unformatted fields were empty.
    Missing,
    /// At least one field was present but neither parsed as an integer.
    Unparseable,
}

/// Resolve a canonical integer parcel identifier from the formatted and
/// unformatted APN fields.
///
/// The unformatted value wins when usable; some carry space, underscore, or
/// hyphen decorations that must be stripped first. The formatted value is
/// the fallback, with hyphens stripped.
pub fn resolve_apn(formatted: &str, unformatted: &str) -> Result<i64, ApnError> {
    let stripped: String = unformatted
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect();
    if let Ok(value) = stripped.parse::<i64>() {
        return Ok(value);
    }

    let stripped: String = formatted.chars().filter(|&c| c != '-').collect();
    if let Ok(value) = stripped.parse::<i64>() {
        return Ok(value);
    }

    if formatted.is_empty() && unformatted.is_empty() {
        return Err(ApnError::Missing);
    }
    Err(ApnError::Unparseable)
}

/// A parsed sale date, noting whether a day-of-month of zero was normalized
/// to the first of the month. The normalization count is reported for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub date: NaiveDate,
    pub day_zero_normalized: bool,
}

/// Parse a sale date in either `YYYY-MM-DD` or `YYYYMMDD` form.
///
/// A day of `00` becomes day 1. Dates not in the calendar fail.
pub fn parse_date(s: &str) -> Option<ParsedDate> {
    let s = s.trim();
    let (year, month, day) = if s.contains('-') {
        let mut parts = s.splitn(3, '-');
        let year: i32 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let day: u32 = parts.next()?.parse().ok()?;
        (year, month, day)
    } else {
        if s.len() < 8 || !s.is_char_boundary(4) || !s.is_char_boundary(6) || !s.is_char_boundary(8)
        {
            return None;
        }
        let year: i32 = s[0..4].parse().ok()?;
        let month: u32 = s[4..6].parse().ok()?;
        let day: u32 = s[6..8].parse().ok()?;
        (year, month, day)
    };

    let day_zero_normalized = day == 0;
    let day = if day == 0 { 1 } else { day };
    NaiveDate::from_ymd_opt(year, month, day).map(|date| ParsedDate {
        date,
        day_zero_normalized,
    })
}

/// Parse a strictly positive number.
pub fn parse_positive(s: &str) -> Option<f64> {
    let value: f64 = s.trim().parse().ok()?;
    (value > 0.0).then_some(value)
}

/// Parse a non-negative number.
pub fn parse_nonnegative(s: &str) -> Option<f64> {
    let value: f64 = s.trim().parse().ok()?;
    (value >= 0.0).then_some(value)
}
