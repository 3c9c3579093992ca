//! Structured-markup ingestor
//!
//! Walks the export as a forward-only event stream and captures the
//! attributes of each record element. The event buffer is cleared after
//! every event, so memory stays flat regardless of export size.

use super::RecordIngestor;
use crate::config::IngestConfig;
use crate::error::LensError;
use crate::store::RecordStore;
use crate::types::{FieldMap, FieldValue, RawRecord};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub struct MarkupIngestor<'a> {
    config: &'a IngestConfig,
}

impl<'a> MarkupIngestor<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    pub fn ingest_reader<R: BufRead>(
        &self,
        source: R,
        store: &mut RecordStore,
    ) -> Result<usize, LensError> {
        let mut reader = Reader::from_reader(source);
        let element = self.config.record_element.as_bytes();
        let mut buf = Vec::new();
        let mut count = 0usize;
        let mut skipped = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == element => {
                    match self.record_from(&e) {
                        Some(record) => {
                            store.push(record);
                            count += 1;
                        }
                        None => skipped += 1,
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    if count == 0 {
                        return Err(LensError::ParseFailure(format!(
                            "markup error at byte {}: {}",
                            reader.buffer_position(),
                            e
                        )));
                    }
                    tracing::warn!(
                        "markup error at byte {}, keeping {} records read so far: {}",
                        reader.buffer_position(),
                        count,
                        e
                    );
                    break;
                }
            }
            buf.clear();
        }

        if skipped > 0 {
            tracing::debug!("{} record elements without a type were skipped", skipped);
        }
        if count == 0 {
            return Err(LensError::ParseFailure(
                "no record elements with a type attribute".to_string(),
            ));
        }
        Ok(count)
    }

    fn record_from(&self, element: &BytesStart<'_>) -> Option<RawRecord> {
        let mut fields = FieldMap::new();
        for attr in element.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::debug!("skipping malformed attribute: {}", e);
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            fields.insert(key, FieldValue::Text(value));
        }
        RawRecord::from_fields(fields, &self.config.type_field)
    }
}

impl RecordIngestor for MarkupIngestor<'_> {
    fn ingest(&self, path: &Path, store: &mut RecordStore) -> Result<usize, LensError> {
        let file = File::open(path)?;
        self.ingest_reader(BufReader::new(file), store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE HealthData>
<HealthData locale="en_US">
 <ExportDate value="2024-01-20 10:00:00 +0800"/>
 <Record type="HKQuantityTypeIdentifierStepCount" sourceName="Watch" unit="count" startDate="2024-01-15 08:00:00 +0800" endDate="2024-01-15 08:10:00 +0800" value="120"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" unit="count/min" startDate="2024-01-15 08:05:00 +0800" value="72">
  <MetadataEntry key="HKMetadataKeyHeartRateMotionContext" value="0"/>
 </Record>
 <Record unit="count" value="5"/>
 <Record type="HKCategoryTypeIdentifierSleepAnalysis" sourceName="Tom &amp; Jerry" value="HKCategoryValueSleepAnalysisAsleepCore" startDate="2024-01-15 00:00:00 +0800" endDate="2024-01-15 06:00:00 +0800"/>
</HealthData>
"#;

    #[test]
    fn test_captures_record_attributes() {
        let config = IngestConfig::default();
        let mut store = RecordStore::new();
        let count = MarkupIngestor::new(&config)
            .ingest_reader(EXPORT.as_bytes(), &mut store)
            .unwrap();

        assert_eq!(count, 3);
        let hr = store
            .records_of_type("HKQuantityTypeIdentifierHeartRate")
            .next()
            .unwrap();
        assert_eq!(hr.fields["value"], FieldValue::Text("72".to_string()));
        assert!(!hr.fields.contains_key("key"));

        let sleep = store
            .records_of_type("HKCategoryTypeIdentifierSleepAnalysis")
            .next()
            .unwrap();
        assert_eq!(sleep.fields["sourceName"].as_text(), "Tom & Jerry");
    }

    #[test]
    fn test_keeps_records_before_damage() {
        let damaged = r#"<HealthData>
 <Record type="StepCount" startDate="2024-01-15" value="10"/>
 <Record type="StepCount" startDate="2024-01-16" value="20"/>
</Broken>
 <Record type="StepCount" startDate="2024-01-17" value="30"/>"#;

        let config = IngestConfig::default();
        let mut store = RecordStore::new();
        let count = MarkupIngestor::new(&config)
            .ingest_reader(damaged.as_bytes(), &mut store)
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_no_records_is_parse_failure() {
        let config = IngestConfig::default();
        let mut store = RecordStore::new();
        let err = MarkupIngestor::new(&config)
            .ingest_reader("<HealthData></HealthData>".as_bytes(), &mut store)
            .unwrap_err();
        assert!(matches!(err, LensError::ParseFailure(_)));
    }
}
