//! Date and value extraction
//!
//! Parsing is strict and fallible. The current-time fallback for
//! unparseable dates is a separate step applied by the metric layer, so
//! callers that must not invent timestamps (correlation) can simply skip.

use crate::alias;
use crate::types::{FieldMap, FieldValue, Timestamp};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("no date field present")]
    Missing,

    #[error("unrecognized timestamp: {0:?}")]
    Unrecognized(String),
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S %:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y/%m/%d %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Parse one timestamp string.
///
/// Accepts offset-suffixed and `Z`-suffixed timestamps, naive local
/// timestamps (carried with a zero offset, wall clock preserved), bare
/// dates (midnight) and RFC 2822 as a last resort.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, TimestampError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TimestampError::Missing);
    }

    let normalized = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(head) => format!("{}+00:00", head),
        None => s.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Ok(dt);
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(wall_clock(naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(wall_clock(naive));
            }
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt);
    }

    Err(TimestampError::Unrecognized(s.to_string()))
}

fn wall_clock(naive: NaiveDateTime) -> Timestamp {
    Utc.fix().from_utc_datetime(&naive)
}

/// Midnight of a calendar date with a zero offset
pub fn start_of_day(date: NaiveDate) -> Option<Timestamp> {
    date.and_hms_opt(0, 0, 0).map(wall_clock)
}

/// Current local time, used when a record's date cannot be parsed
pub fn now_fallback() -> Timestamp {
    let now = Local::now();
    now.with_timezone(now.offset())
}

/// Timestamp extracted from a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedTimestamp {
    pub at: Timestamp,
    /// The current-time fallback was used
    pub estimated: bool,
}

/// Walk the date alias list and return the first field that parses
pub fn find_timestamp(fields: &FieldMap, candidates: &[String]) -> Result<Timestamp, TimestampError> {
    let mut last_err = TimestampError::Missing;
    for (_, value) in alias::all_present(fields, candidates) {
        match parse_timestamp(&value.as_text()) {
            Ok(at) => return Ok(at),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Extract a timestamp, never failing: unparseable or missing dates fall
/// back to the current time and are flagged as estimated
pub fn extract_timestamp(fields: &FieldMap, candidates: &[String]) -> ExtractedTimestamp {
    match find_timestamp(fields, candidates) {
        Ok(at) => ExtractedTimestamp {
            at,
            estimated: false,
        },
        Err(e) => {
            tracing::debug!("timestamp fallback to current time: {}", e);
            ExtractedTimestamp {
                at: now_fallback(),
                estimated: true,
            }
        }
    }
}

/// Value extracted from a record
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Numeric(f64),
    /// Present but not coercible; kept untransformed
    Raw(FieldValue),
}

impl ExtractedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ExtractedValue::Numeric(n) => Some(*n),
            ExtractedValue::Raw(_) => None,
        }
    }
}

/// Coerce the first present value field; `None` if no candidate is present
pub fn extract_value(fields: &FieldMap, candidates: &[String]) -> Option<ExtractedValue> {
    let (_, value) = alias::first_present(fields, candidates)?;
    Some(match value.to_number() {
        Ok(n) => ExtractedValue::Numeric(n),
        Err(_) => ExtractedValue::Raw(value.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn date_aliases() -> Vec<String> {
        ["startDate", "endDate", "date", "日期", "Start", "End"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_supported_spellings() {
        let cases = [
            ("2024-01-15 08:30:00 +0800", 8, 8 * 3600),
            ("2024-01-15T08:30:00Z", 8, 0),
            ("2024-01-15T08:30:00.250+02:00", 8, 2 * 3600),
            ("2024-01-15 08:30:00", 8, 0),
            ("2024/01/15 08:30", 8, 0),
            ("2024-01-15", 0, 0),
        ];
        for (raw, hour, offset) in cases {
            let ts = parse_timestamp(raw).unwrap_or_else(|e| panic!("{}: {}", raw, e));
            assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), "{}", raw);
            assert_eq!(ts.hour(), hour, "{}", raw);
            assert_eq!(ts.offset().local_minus_utc(), offset, "{}", raw);
        }
    }

    #[test]
    fn test_calendar_date_uses_own_offset() {
        let ts = parse_timestamp("2024-01-15 23:30:00 -0500").unwrap();
        assert_eq!(ts.day(), 15);
    }

    #[test]
    fn test_unrecognized_is_error() {
        assert!(matches!(
            parse_timestamp("yesterday-ish"),
            Err(TimestampError::Unrecognized(_))
        ));
        assert_eq!(parse_timestamp("   "), Err(TimestampError::Missing));
    }

    #[test]
    fn test_extract_walks_aliases() {
        let mut fields = FieldMap::new();
        fields.insert("startDate".to_string(), "not a date".into());
        fields.insert("日期".to_string(), "2023-06-01 07:00:00".into());

        let extracted = extract_timestamp(&fields, &date_aliases());
        assert!(!extracted.estimated);
        assert_eq!(extracted.at.month(), 6);
    }

    #[test]
    fn test_extract_never_drops_record() {
        let mut fields = FieldMap::new();
        fields.insert("type".to_string(), "StepCount".into());
        let extracted = extract_timestamp(&fields, &date_aliases());
        assert!(extracted.estimated);

        fields.insert("Start".to_string(), "garbage".into());
        let extracted = extract_timestamp(&fields, &date_aliases());
        assert!(extracted.estimated);
    }

    #[test]
    fn test_extract_value_keeps_raw() {
        let candidates: Vec<String> = vec!["value".into(), "Value".into()];
        let mut fields = FieldMap::new();
        fields.insert("Value".to_string(), "HKCategoryValueSleepAnalysisInBed".into());
        assert_eq!(
            extract_value(&fields, &candidates),
            Some(ExtractedValue::Raw("HKCategoryValueSleepAnalysisInBed".into()))
        );

        fields.insert("value".to_string(), "72".into());
        assert_eq!(
            extract_value(&fields, &candidates).and_then(|v| v.as_number()),
            Some(72.0)
        );
        assert_eq!(extract_value(&FieldMap::new(), &candidates), None);
    }
}
