//! Object-array ingestor
//!
//! Reads a top-level JSON array one element at a time through a sequence
//! visitor, so only the current element is materialized.

use super::RecordIngestor;
use crate::config::IngestConfig;
use crate::error::LensError;
use crate::store::RecordStore;
use crate::types::{FieldMap, FieldValue, RawRecord};
use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::Deserializer;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct ObjectArrayIngestor<'a> {
    config: &'a IngestConfig,
}

impl<'a> ObjectArrayIngestor<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    pub fn ingest_reader<R: Read>(
        &self,
        source: R,
        store: &mut RecordStore,
    ) -> Result<usize, LensError> {
        let mut deserializer = serde_json::Deserializer::from_reader(source);
        let records = deserializer
            .deserialize_any(ArrayVisitor {
                type_field: &self.config.type_field,
            })
            .and_then(|records| deserializer.end().map(|_| records))
            .map_err(|e| LensError::ParseFailure(format!("object array: {}", e)))?;

        // A file that fails halfway contributes nothing
        let count = records.len();
        for record in records {
            store.push(record);
        }
        if count == 0 {
            return Err(LensError::ParseFailure(
                "no objects with a type field".to_string(),
            ));
        }
        Ok(count)
    }
}

impl RecordIngestor for ObjectArrayIngestor<'_> {
    fn ingest(&self, path: &Path, store: &mut RecordStore) -> Result<usize, LensError> {
        let file = File::open(path)?;
        self.ingest_reader(BufReader::new(file), store)
    }
}

/// Visits the top level; anything other than an array yields no records
struct ArrayVisitor<'s> {
    type_field: &'s str,
}

impl<'de, 's> Visitor<'de> for ArrayVisitor<'s> {
    type Value = Vec<RawRecord>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON document")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut records = Vec::new();
        while let Some(element) = seq.next_element::<serde_json::Value>()? {
            if let Some(record) = record_from_value(element, self.type_field) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(Vec::new())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }
}

/// Keep only objects carrying a non-empty string type; nulls become absent
fn record_from_value(value: serde_json::Value, type_field: &str) -> Option<RawRecord> {
    let serde_json::Value::Object(object) = value else {
        return None;
    };

    let mut fields = FieldMap::new();
    for (key, value) in object {
        let field = match value {
            serde_json::Value::String(s) => FieldValue::Text(s),
            serde_json::Value::Bool(b) => FieldValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => match n.as_f64() {
                    Some(f) => FieldValue::Number(f),
                    None => continue,
                },
            },
            serde_json::Value::Null => continue,
            nested => FieldValue::Text(nested.to_string()),
        };
        fields.insert(key, field);
    }
    RawRecord::from_fields(fields, type_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(json: &str) -> (Result<usize, LensError>, RecordStore) {
        let config = IngestConfig::default();
        let mut store = RecordStore::new();
        let result = ObjectArrayIngestor::new(&config).ingest_reader(json.as_bytes(), &mut store);
        (result, store)
    }

    #[test]
    fn test_keeps_typed_objects_only() {
        let (result, store) = ingest(
            r#"[
                {"type": "HeartRate", "startDate": "2024-01-15 08:00:00", "value": 72, "note": null},
                {"type": "", "value": 1},
                {"value": 2},
                "stray",
                {"type": 5, "value": 3},
                {"type": "StepCount", "date": "2024-01-15", "value": "1200", "meta": {"a": 1}}
            ]"#,
        );
        assert_eq!(result.unwrap(), 2);

        let hr = store.records_of_type("HeartRate").next().unwrap();
        assert_eq!(hr.fields["value"], FieldValue::Integer(72));
        assert!(!hr.fields.contains_key("note"));

        let steps = store.records_of_type("StepCount").next().unwrap();
        assert_eq!(steps.fields["meta"].as_text(), r#"{"a":1}"#);
    }

    #[test]
    fn test_non_array_yields_no_records() {
        let (result, store) = ingest(r#"{"type": "HeartRate", "value": 72}"#);
        assert!(matches!(result, Err(LensError::ParseFailure(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_json_contributes_nothing() {
        let (result, store) = ingest(r#"[{"type": "HeartRate", "value": 70}, {"type": "HeartRate", "value": 7"#);
        assert!(matches!(result, Err(LensError::ParseFailure(_))));
        assert!(store.is_empty());
    }
}
