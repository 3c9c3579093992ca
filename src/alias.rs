//! Alias list resolution
//!
//! Vendors spell the same concept many ways. Every lookup here walks an
//! ordered candidate list and takes the first hit.

use crate::types::{FieldMap, FieldValue};

/// First candidate field that is present and not blank
pub fn first_present<'a>(
    fields: &'a FieldMap,
    candidates: &'a [String],
) -> Option<(&'a str, &'a FieldValue)> {
    candidates.iter().find_map(|name| {
        fields
            .get(name)
            .filter(|v| !v.is_blank())
            .map(|v| (name.as_str(), v))
    })
}

/// Every present, non-blank candidate field, in candidate order
pub fn all_present<'a>(
    fields: &'a FieldMap,
    candidates: &'a [String],
) -> impl Iterator<Item = (&'a str, &'a FieldValue)> + 'a {
    candidates.iter().filter_map(move |name| {
        fields
            .get(name)
            .filter(|v| !v.is_blank())
            .map(|v| (name.as_str(), v))
    })
}

/// Resolve a column name case-insensitively; candidate order wins over
/// column order
pub fn resolve_column<'a, I>(columns: I, candidates: &[String]) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<(String, &str)> = columns
        .into_iter()
        .map(|c| (c.trim().to_lowercase(), c))
        .collect();
    candidates.iter().find_map(|candidate| {
        let wanted = candidate.to_lowercase();
        columns
            .iter()
            .find(|(lower, _)| *lower == wanted)
            .map(|(_, original)| original.to_string())
    })
}

/// Case-insensitive substring match against any of the given needles
pub fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
}

/// Whether a raw type identifier belongs to an alias list
pub fn is_alias(record_type: &str, aliases: &[String]) -> bool {
    aliases.iter().any(|a| a == record_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_present_skips_blank() {
        let mut fields = FieldMap::new();
        fields.insert("startDate".to_string(), "  ".into());
        fields.insert("date".to_string(), "2024-01-15".into());

        let candidates = names(&["startDate", "endDate", "date"]);
        let (name, value) = first_present(&fields, &candidates).unwrap();
        assert_eq!(name, "date");
        assert_eq!(value.as_text(), "2024-01-15");
    }

    #[test]
    fn test_resolve_column_prefers_candidate_order() {
        let columns = ["Date", "StartDate", "Value"];
        let candidates = names(&["startDate", "date"]);
        assert_eq!(
            resolve_column(columns.iter().copied(), &candidates),
            Some("StartDate".to_string())
        );
        assert_eq!(
            resolve_column(["type"].iter().copied(), &candidates),
            None
        );
    }

    #[test]
    fn test_contains_any_is_case_insensitive() {
        let states = names(&["asleep", "inBed"]);
        assert!(contains_any("HKCategoryValueSleepAnalysisAsleepCore", &states));
        assert!(contains_any("HKCategoryValueSleepAnalysisInBed", &states));
        assert!(!contains_any("HKCategoryValueSleepAnalysisAwake", &states));
    }
}
