//! Record store
//!
//! Holds every ingested record in arrival order plus a type → positions
//! index. One store belongs to one analysis session.

use crate::types::RawRecord;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<RawRecord>,
    index: HashMap<String, Vec<usize>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and index it by type
    pub fn push(&mut self, record: RawRecord) {
        let position = self.records.len();
        self.index
            .entry(record.record_type.clone())
            .or_default()
            .push(position);
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn contains_type(&self, record_type: &str) -> bool {
        self.index.contains_key(record_type)
    }

    /// Records of one type, in ingestion order
    pub fn records_of_type<'a>(&'a self, record_type: &str) -> impl Iterator<Item = &'a RawRecord> + 'a {
        self.index
            .get(record_type)
            .map(|positions| positions.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.records[i])
    }

    /// Records of every listed type; each alias contributes all of its records
    pub fn records_of_types<'a>(&'a self, aliases: &'a [String]) -> impl Iterator<Item = &'a RawRecord> + 'a {
        aliases
            .iter()
            .flat_map(move |alias| self.records_of_type(alias))
    }

    /// Type identifier → record count, ordered by type
    pub fn type_counts(&self) -> BTreeMap<String, usize> {
        self.index
            .iter()
            .map(|(t, positions)| (t.clone(), positions.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldMap;

    fn record(t: &str, value: &str) -> RawRecord {
        let mut fields = FieldMap::new();
        fields.insert("value".to_string(), value.into());
        RawRecord::new(t, fields).unwrap()
    }

    #[test]
    fn test_index_preserves_order() {
        let mut store = RecordStore::new();
        store.push(record("StepCount", "1"));
        store.push(record("HeartRate", "60"));
        store.push(record("StepCount", "2"));

        let steps: Vec<_> = store
            .records_of_type("StepCount")
            .map(|r| r.fields["value"].as_text().into_owned())
            .collect();
        assert_eq!(steps, vec!["1", "2"]);
        assert_eq!(store.records_of_type("Missing").count(), 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_all_aliases_contribute() {
        let mut store = RecordStore::new();
        store.push(record("HKQuantityTypeIdentifierStepCount", "10"));
        store.push(record("StepCount", "20"));
        store.push(record("com.apple.health.type.quantity.steps", "30"));

        let aliases: Vec<String> = vec![
            "HKQuantityTypeIdentifierStepCount".into(),
            "com.apple.health.type.quantity.steps".into(),
            "StepCount".into(),
        ];
        assert_eq!(store.records_of_types(&aliases).count(), 3);

        let counts = store.type_counts();
        assert_eq!(counts.keys().next().map(String::as_str), Some("HKQuantityTypeIdentifierStepCount"));
    }
}
