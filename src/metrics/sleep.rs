//! Sleep duration derivation

use crate::alias;
use crate::config::{FieldAliases, SleepStateFallback};
use crate::timestamp::{extract_timestamp, find_timestamp};
use crate::types::{RawRecord, Timestamp};

/// One sleep record reduced to its start, duration and state
#[derive(Debug, Clone, PartialEq)]
pub struct SleepInterval {
    pub start: Timestamp,
    pub estimated: bool,
    pub hours: f64,
    pub state: Option<String>,
}

/// Reduce a sleep record; `None` when no duration can be determined.
///
/// An explicit duration field wins over end minus start.
pub fn interval_of(record: &RawRecord, fields: &FieldAliases) -> Option<SleepInterval> {
    let start = extract_timestamp(&record.fields, &fields.date);
    let state = alias::first_present(&record.fields, &fields.value)
        .map(|(_, v)| v.as_text().into_owned());

    let explicit = alias::first_present(&record.fields, &fields.duration)
        .and_then(|(_, v)| v.to_number().ok());
    let hours = match explicit {
        Some(hours) => hours,
        None => {
            let end = find_timestamp(&record.fields, &fields.end_date).ok()?;
            (end - start.at).num_milliseconds() as f64 / 3_600_000.0
        }
    };

    Some(SleepInterval {
        start: start.at,
        estimated: start.estimated,
        hours,
        state,
    })
}

/// Keep asleep/in-bed intervals. Returns the kept intervals and whether the
/// unfiltered set was used because nothing matched.
pub fn filter_states(
    intervals: Vec<SleepInterval>,
    states: &[String],
    fallback: SleepStateFallback,
) -> (Vec<SleepInterval>, bool) {
    let matching: Vec<SleepInterval> = intervals
        .iter()
        .filter(|i| {
            i.state
                .as_deref()
                .map(|s| alias::contains_any(s, states))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    if !matching.is_empty() || intervals.is_empty() {
        return (matching, false);
    }

    match fallback {
        SleepStateFallback::UseAll => {
            tracing::warn!(
                "no sleep record matched {:?}, using all {} records",
                states,
                intervals.len()
            );
            (intervals, true)
        }
        SleepStateFallback::Strict => {
            tracing::warn!("no sleep record matched {:?}, strict policy yields no days", states);
            (Vec::new(), false)
        }
    }
}
