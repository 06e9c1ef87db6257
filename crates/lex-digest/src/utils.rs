//! Shared parsing utilities.
//!
//! Cell-level recognisers used by type inference and by the typed extraction
//! of chunk columns: missing markers, boolean tokens, locale-tolerant numbers
//! and the ordered list of date/time patterns.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a polars data type for inference purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    /// Integer or floating point numbers
    Numeric,
    /// Date or datetime types
    Temporal,
    /// Boolean type
    Boolean,
    /// String type (values still need parsing)
    String,
    /// Anything else; handled through its string rendering
    Other,
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a calendar type.
#[inline]
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

/// Get the category of a DataType.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    if is_numeric_dtype(dtype) {
        DtypeCategory::Numeric
    } else if is_temporal_dtype(dtype) {
        DtypeCategory::Temporal
    } else if matches!(dtype, DataType::Boolean) {
        DtypeCategory::Boolean
    } else if matches!(dtype, DataType::String) {
        DtypeCategory::String
    } else {
        DtypeCategory::Other
    }
}

// =============================================================================
// Missing Markers
// =============================================================================

/// Cell texts treated as an explicit missing value (compared case-insensitively).
pub const NULL_MARKERS: [&str; 8] = ["na", "n/a", "null", "none", "nan", "#n/a", "missing", "-"];

/// Check if a string is a missing-value marker.
pub fn is_missing_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    NULL_MARKERS.iter().any(|&marker| lower == marker)
}

/// Trim a raw cell and map empty strings and null markers to `None`.
pub fn normalize_cell(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_missing_marker(trimmed) {
        None
    } else {
        Some(trimmed)
    }
}

/// Render any series as normalized cell text.
pub fn series_to_strings(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    let rendered = series.cast(&DataType::String)?;
    let values = rendered.str()?;
    Ok(values
        .into_iter()
        .map(|v| v.and_then(normalize_cell).map(str::to_string))
        .collect())
}

// =============================================================================
// Boolean Detection
// =============================================================================

/// Tokens read as boolean true, including Portuguese, Spanish, French and German forms.
pub const BOOLEAN_TRUE_VALUES: [&str; 14] = [
    "true", "yes", "1", "t", "y", "on", "sim", "s", "verdadeiro", "si", "sí", "oui", "ja",
    "wahr",
];

/// Tokens read as boolean false.
pub const BOOLEAN_FALSE_VALUES: [&str; 11] = [
    "false", "no", "0", "f", "n", "off", "não", "nao", "falso", "non", "nein",
];

/// Parse a boolean token.
pub fn parse_boolean_token(s: &str) -> Option<bool> {
    let lower = s.trim().to_lowercase();
    if BOOLEAN_TRUE_VALUES.iter().any(|&v| v == lower) {
        Some(true)
    } else if BOOLEAN_FALSE_VALUES.iter().any(|&v| v == lower) {
        Some(false)
    } else {
        None
    }
}

// =============================================================================
// Numeric Parsing
// =============================================================================

/// Characters stripped before numeric parsing.
pub const NUMERIC_FORMAT_CHARS: [char; 7] = ['$', '%', '€', '£', ' ', '_', '\''];

static PLAIN_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("Invalid regex: plain number")
});

/// Parse a number written with thousands separators and either `.` or `,` as
/// the decimal mark.
///
/// When both marks appear the last one is the decimal mark. A lone comma
/// followed by exactly three digits is a thousands separator (`1,234`);
/// otherwise it is a decimal mark (`3,5`). Repeated marks are separators and
/// must group digits in threes.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix("R$").unwrap_or(trimmed);
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !NUMERIC_FORMAT_CHARS.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) => cleaned,
        (0, 1) => cleaned,
        (1, 0) => {
            let (int_part, frac_part) = cleaned.split_once(',')?;
            let digits = int_part.trim_start_matches(['+', '-']);
            if frac_part.len() == 3 && !digits.is_empty() && digits.len() <= 3 && digits != "0" {
                format!("{int_part}{frac_part}")
            } else {
                format!("{int_part}.{frac_part}")
            }
        }
        (c, 0) if c > 1 => strip_grouping(&cleaned, ',')?,
        (0, d) if d > 1 => strip_grouping(&cleaned, '.')?,
        _ => {
            let last_comma = cleaned.rfind(',')?;
            let last_dot = cleaned.rfind('.')?;
            let (decimal, separator) = if last_comma > last_dot {
                (',', '.')
            } else {
                ('.', ',')
            };
            let (int_part, frac_part) = cleaned.rsplit_once(decimal)?;
            if int_part.contains(decimal) {
                return None;
            }
            let int_part = strip_grouping(int_part, separator)?;
            format!("{int_part}.{frac_part}")
        }
    };

    if !PLAIN_NUMBER.is_match(&normalized) {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Remove a thousands separator after checking the digits group in threes.
fn strip_grouping(s: &str, separator: char) -> Option<String> {
    let mut groups = s.split(separator);
    let head = groups.next()?;
    let head_digits = head.trim_start_matches(['+', '-']);
    if head_digits.is_empty() || head_digits.len() > 3 {
        return None;
    }
    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

// =============================================================================
// Temporal Parsing
// =============================================================================

/// One entry of the ordered date/time pattern list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalPattern {
    /// RFC 3339 with offset; normalised to UTC.
    Rfc3339,
    /// A chrono format carrying a time of day.
    DateTime(&'static str),
    /// A chrono format carrying only a date.
    Date(&'static str),
}

impl TemporalPattern {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rfc3339 => "rfc3339",
            Self::DateTime(fmt) | Self::Date(fmt) => fmt,
        }
    }

    pub fn parse(&self, s: &str) -> Option<NaiveDateTime> {
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()),
            Self::DateTime(fmt) => NaiveDateTime::parse_from_str(s, fmt).ok(),
            Self::Date(fmt) => NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        }
    }
}

/// Date/time patterns in priority order. Day-first forms come before
/// month-first forms; a column is matched to the first pattern that parses
/// enough of its values.
pub const TEMPORAL_PATTERNS: [TemporalPattern; 14] = [
    TemporalPattern::Rfc3339,
    TemporalPattern::DateTime("%Y-%m-%dT%H:%M:%S%.f"),
    TemporalPattern::DateTime("%Y-%m-%d %H:%M:%S%.f"),
    TemporalPattern::DateTime("%Y-%m-%dT%H:%M"),
    TemporalPattern::DateTime("%Y-%m-%d %H:%M"),
    TemporalPattern::Date("%Y-%m-%d"),
    TemporalPattern::Date("%Y/%m/%d"),
    TemporalPattern::DateTime("%d/%m/%Y %H:%M:%S"),
    TemporalPattern::DateTime("%d/%m/%Y %H:%M"),
    TemporalPattern::Date("%d/%m/%Y"),
    TemporalPattern::DateTime("%m/%d/%Y %H:%M:%S"),
    TemporalPattern::Date("%m/%d/%Y"),
    TemporalPattern::Date("%d-%m-%Y"),
    TemporalPattern::Date("%d.%m.%Y"),
];

// Cheap pre-filter so only date-shaped cells pay for chrono parsing.
static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}").expect("Invalid regex: date shape")
});

/// Whether a cell is worth trying against the temporal patterns.
pub fn looks_like_date(s: &str) -> bool {
    DATE_SHAPE.is_match(s.trim())
}

/// Parse with the first matching pattern, if any.
pub fn parse_temporal(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if !looks_like_date(trimmed) {
        return None;
    }
    TEMPORAL_PATTERNS.iter().find_map(|p| p.parse(trimmed))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_dtype_category() {
        assert_eq!(get_dtype_category(&DataType::Int32), DtypeCategory::Numeric);
        assert_eq!(get_dtype_category(&DataType::Date), DtypeCategory::Temporal);
        assert_eq!(get_dtype_category(&DataType::Boolean), DtypeCategory::Boolean);
        assert_eq!(get_dtype_category(&DataType::String), DtypeCategory::String);
    }

    #[test]
    fn test_missing_markers() {
        assert!(is_missing_marker("N/A"));
        assert!(is_missing_marker("  null "));
        assert!(is_missing_marker("NaN"));
        assert!(!is_missing_marker("0"));
        assert_eq!(normalize_cell("   "), None);
        assert_eq!(normalize_cell(" abc "), Some("abc"));
    }

    #[test]
    fn test_parse_numeric_plain() {
        assert_eq!(parse_numeric_string("42"), Some(42.0));
        assert_eq!(parse_numeric_string("-100.5"), Some(-100.5));
        assert_eq!(parse_numeric_string("1e3"), Some(1000.0));
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("hello"), None);
        assert_eq!(parse_numeric_string("inf"), None);
    }

    #[test]
    fn test_parse_numeric_thousands_and_decimal_marks() {
        assert_eq!(parse_numeric_string("$1,234.56"), Some(1234.56));
        assert_eq!(parse_numeric_string("1.234,56"), Some(1234.56));
        assert_eq!(parse_numeric_string("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_numeric_string("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_numeric_string("3,5"), Some(3.5));
        assert_eq!(parse_numeric_string("0,125"), Some(0.125));
        assert_eq!(parse_numeric_string("1,234"), Some(1234.0));
        assert_eq!(parse_numeric_string("1 000"), Some(1000.0));
        assert_eq!(parse_numeric_string("R$ 12,50"), Some(12.5));
        assert_eq!(parse_numeric_string("42%"), Some(42.0));
    }

    #[test]
    fn test_parse_numeric_rejects_bad_grouping() {
        assert_eq!(parse_numeric_string("1,2,3"), None);
        assert_eq!(parse_numeric_string("12.34.5"), None);
        assert_eq!(parse_numeric_string("2024-01-15"), None);
    }

    #[test]
    fn test_boolean_tokens() {
        assert_eq!(parse_boolean_token("TRUE"), Some(true));
        assert_eq!(parse_boolean_token("sim"), Some(true));
        assert_eq!(parse_boolean_token("Não"), Some(false));
        assert_eq!(parse_boolean_token("0"), Some(false));
        assert_eq!(parse_boolean_token("maybe"), None);
        assert_eq!(parse_boolean_token("nein"), Some(false));
    }

    #[test]
    fn test_parse_temporal_patterns() {
        let iso = parse_temporal("2024-01-15").unwrap();
        assert_eq!(iso.to_string(), "2024-01-15 00:00:00");

        let with_time = parse_temporal("2024-01-15T10:30:00").unwrap();
        assert_eq!(with_time.to_string(), "2024-01-15 10:30:00");

        let fractional = parse_temporal("2024-01-15 10:30:00.250").unwrap();
        assert_eq!(fractional.format("%H:%M:%S").to_string(), "10:30:00");

        let day_first = parse_temporal("25/03/2024").unwrap();
        assert_eq!(day_first.format("%Y-%m-%d").to_string(), "2024-03-25");

        let month_first = parse_temporal("01/15/2024").unwrap();
        assert_eq!(month_first.format("%Y-%m-%d").to_string(), "2024-01-15");

        let offset = parse_temporal("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(offset.format("%H:%M").to_string(), "08:30");
    }

    #[test]
    fn test_parse_temporal_rejects_non_dates() {
        assert!(parse_temporal("1705312200").is_none());
        assert!(parse_temporal("not a date").is_none());
        assert!(parse_temporal("2024-13-45").is_none());
    }

    #[test]
    fn test_series_to_strings_normalizes() {
        let series = Series::new("col".into(), &[Some(" a "), Some("N/A"), None, Some("")]);
        let values = series_to_strings(&series).unwrap();
        assert_eq!(values, vec![Some("a".to_string()), None, None, None]);
    }
}
