//! ECG signal-export parser
//!
//! A signal file starts with `key,value` metadata lines and continues with
//! one sample per line. The first line that is not usable metadata but
//! parses as a number switches the parser into signal mode for good.

use crate::alias;
use crate::config::{EcgConfig, FieldAliases};
use crate::error::LensError;
use crate::store::RecordStore;
use crate::text::decode_with_fallback;
use crate::timestamp::{find_timestamp, parse_timestamp};
use crate::types::{EcgRecord, EcgSource, Timestamp};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct EcgParser<'a> {
    config: &'a EcgConfig,
}

/// Metadata header and signal body of one file, before field extraction
#[derive(Debug, Default)]
struct SignalDocument {
    metadata: HashMap<String, String>,
    signal: Vec<f64>,
}

impl<'a> EcgParser<'a> {
    pub fn new(config: &'a EcgConfig) -> Self {
        Self { config }
    }

    /// Parse decoded text of one signal file
    pub fn parse_text(&self, text: &str, filename: &str) -> Result<EcgRecord, LensError> {
        let doc = split_document(text);

        let timestamp = self.find_date(&doc.metadata).ok_or_else(|| {
            LensError::ParseFailure(format!("{}: no parseable recording date", filename))
        })?;

        Ok(EcgRecord {
            filename: filename.to_string(),
            timestamp,
            classification: first_value(&doc.metadata, &self.config.classification_keys),
            device: first_value(&doc.metadata, &self.config.device_keys),
            sampling_rate_hz: first_value(&doc.metadata, &self.config.sampling_rate_keys)
                .and_then(|v| numeric_prefix(&v)),
            average_heart_rate: None,
            sample_count: doc.signal.len(),
            signal: doc.signal,
            source: EcgSource::SignalFile,
        })
    }

    pub fn parse_bytes(&self, bytes: &[u8], filename: &str) -> Result<EcgRecord, LensError> {
        let (text, _) = decode_with_fallback(bytes, &self.config.encodings, filename)?;
        self.parse_text(&text, filename)
    }

    pub fn parse_file(&self, path: &Path) -> Result<EcgRecord, LensError> {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = fs::read(path)?;
        self.parse_bytes(&bytes, &filename)
    }

    /// Parse every `.csv` file directly inside the given directories.
    ///
    /// Files that fail are skipped with a warning. The result is sorted by
    /// timestamp; ties keep file-name order.
    pub fn parse_directories(&self, directories: &[PathBuf]) -> Vec<EcgRecord> {
        let mut records = Vec::new();
        for dir in directories {
            let mut files = match signal_files(dir) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("cannot list {}: {}", dir.display(), e);
                    continue;
                }
            };
            files.sort();
            for file in files {
                match self.parse_file(&file) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!("skipping ECG file {}: {}", file.display(), e),
                }
            }
        }
        records.sort_by_key(|r| r.timestamp);
        tracing::debug!("parsed {} ECG signal files", records.len());
        records
    }

    fn find_date(&self, metadata: &HashMap<String, String>) -> Option<Timestamp> {
        self.config
            .date_keys
            .iter()
            .filter_map(|key| metadata.get(key))
            .find_map(|value| parse_timestamp(value).ok())
    }

    /// ECG entries of the structured export: classification and average
    /// heart rate, no samples. Entries without a parseable date are skipped.
    pub fn from_store(
        &self,
        store: &RecordStore,
        aliases: &[String],
        fields: &FieldAliases,
    ) -> Vec<EcgRecord> {
        let mut records: Vec<EcgRecord> = store
            .records_of_types(aliases)
            .filter_map(|record| {
                let timestamp = match find_timestamp(&record.fields, &fields.date) {
                    Ok(ts) => ts,
                    Err(e) => {
                        tracing::debug!("skipping ECG entry: {}", e);
                        return None;
                    }
                };
                let classification =
                    alias::first_present(&record.fields, &self.config.export_classification_fields)
                        .map(|(_, v)| v.as_text().into_owned());
                let average_heart_rate =
                    alias::first_present(&record.fields, &self.config.export_heart_rate_fields)
                        .and_then(|(_, v)| v.to_number().ok());

                let origin = record
                    .field("sourceName")
                    .map(|v| v.as_text().into_owned())
                    .unwrap_or_else(|| record.record_type.clone());

                Some(EcgRecord {
                    filename: format!("{}@{}", origin, timestamp.to_rfc3339()),
                    timestamp,
                    classification,
                    device: record.field("device").map(|v| v.as_text().into_owned()),
                    sampling_rate_hz: None,
                    average_heart_rate,
                    signal: Vec::new(),
                    sample_count: 0,
                    source: EcgSource::Export,
                })
            })
            .collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }
}

fn split_document(text: &str) -> SignalDocument {
    let mut doc = SignalDocument::default();
    let mut in_signal = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if !in_signal {
            if let Some((key, value)) = line.split_once(',') {
                let key = key.trim();
                if !key.is_empty() {
                    doc.metadata
                        .entry(key.to_string())
                        .or_insert_with(|| value.trim().to_string());
                    continue;
                }
            }
        }

        match line.parse::<f64>() {
            Ok(sample) if sample.is_finite() => {
                in_signal = true;
                doc.signal.push(sample);
            }
            _ => {}
        }
    }
    doc
}

fn first_value(metadata: &HashMap<String, String>, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|k| metadata.get(k))
        .find(|v| !v.is_empty())
        .cloned()
}

/// Leading number of a value such as "500 Hz" or "512Hz"
fn numeric_prefix(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

fn signal_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldMap, RawRecord};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn fixture(date_line: &str, samples: usize) -> String {
        let mut text = String::new();
        text.push_str("Name,Jane Doe\n");
        text.push_str(date_line);
        text.push('\n');
        text.push_str("Classification,Sinus Rhythm\n");
        text.push_str("Device,Watch7,1\n");
        text.push_str("Sampling Frequency,512 Hz\n\n");
        for i in 0..samples {
            text.push_str(&format!("{:.3}\n", (i as f64 * 0.1).sin() * 100.0));
        }
        text
    }

    #[test]
    fn test_metadata_then_signal() {
        let text = "Date,2024-01-15 08:30:00 +0800\nClassification,Sinus Rhythm\nSampling Frequency,500 Hz\n"
            .to_string()
            + &"0.25\n".repeat(500);

        let config = EcgConfig::default();
        let record = EcgParser::new(&config).parse_text(&text, "ecg.csv").unwrap();

        assert_eq!(record.sample_count, 500);
        assert_eq!(record.signal.len(), 500);
        assert_eq!(record.timestamp.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(record.classification.as_deref(), Some("Sinus Rhythm"));
        assert_eq!(record.sampling_rate_hz, Some(500.0));
        assert_eq!(record.source, EcgSource::SignalFile);
    }

    #[test]
    fn test_value_split_once_and_first_key_wins() {
        let text = fixture("Date,2024-02-01 10:00:00 -0500", 3) + "Device,ignored\n";
        let config = EcgConfig::default();
        let record = EcgParser::new(&config).parse_text(&text, "ecg.csv").unwrap();

        assert_eq!(record.device.as_deref(), Some("Watch7,1"));
        assert_eq!(record.sampling_rate_hz, Some(512.0));
        assert_eq!(record.sample_count, 3);
    }

    #[test]
    fn test_signal_mode_is_sticky() {
        let text = "Date,2024-01-15\n,5\n1.0\n2.0\nLead,I\nnoise\n3.0\n";
        let config = EcgConfig::default();
        let record = EcgParser::new(&config).parse_text(text, "ecg.csv").unwrap();
        assert_eq!(record.signal, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unparseable_date_tries_next_key() {
        let text = "記錄日期,not a date\nDate,2024-03-03 09:00:00\n1.0\n";
        let config = EcgConfig::default();
        let record = EcgParser::new(&config).parse_text(text, "ecg.csv").unwrap();
        assert_eq!(record.timestamp.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
    }

    #[test]
    fn test_gb18030_file() {
        let text = "记录日期,2024-01-15 08:30:00 +0800\n分类,窦性心律\n设备,手表\n采样频率,512 赫兹\n1.5\n-2.5\n";
        let (bytes, _, _) = encoding_rs::GB18030.encode(text);
        assert!(std::str::from_utf8(&bytes).is_err());

        let config = EcgConfig::default();
        let record = EcgParser::new(&config).parse_bytes(&bytes, "ecg.csv").unwrap();
        assert_eq!(record.classification.as_deref(), Some("窦性心律"));
        assert_eq!(record.device.as_deref(), Some("手表"));
        assert_eq!(record.sampling_rate_hz, Some(512.0));
        assert_eq!(record.signal, vec![1.5, -2.5]);
    }

    #[test]
    fn test_directory_skips_undated_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), fixture("Date,2024-05-02 08:00:00", 10)).unwrap();
        fs::write(dir.path().join("b.csv"), fixture("Date,unknown", 10)).unwrap();
        fs::write(dir.path().join("c.csv"), fixture("Date,2024-05-01 08:00:00", 20)).unwrap();
        fs::write(dir.path().join("notes.txt"), "Date,2024-01-01\n1\n").unwrap();

        let config = EcgConfig::default();
        let records = EcgParser::new(&config).parse_directories(&[dir.path().to_path_buf()]);

        let names: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["c.csv", "a.csv"]);
        assert_eq!(records[0].sample_count, 20);
    }

    #[test]
    fn test_from_store_entries() {
        let mut store = RecordStore::new();
        let mut fields = FieldMap::new();
        fields.insert("type".into(), "HKDataTypeIdentifierElectrocardiogram".into());
        fields.insert("startDate".into(), "2024-01-15 08:30:00 +0800".into());
        fields.insert("classification".into(), "SinusRhythm".into());
        fields.insert("averageHeartRate".into(), "68".into());
        store.push(RawRecord::from_fields(fields, "type").unwrap());

        let mut second = FieldMap::new();
        second.insert("type".into(), "HKDataTypeIdentifierElectrocardiogram".into());
        second.insert("sourceName".into(), "ECG".into());
        second.insert("startDate".into(), "2024-01-15 09:00:00 +0800".into());
        store.push(RawRecord::from_fields(second, "type").unwrap());

        let config = EcgConfig::default();
        let aliases = crate::config::MetricAliases::default().ecg;
        let records =
            EcgParser::new(&config).from_store(&store, &aliases, &FieldAliases::default());

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].filename,
            "HKDataTypeIdentifierElectrocardiogram@2024-01-15T08:30:00+08:00"
        );
        assert_eq!(records[1].filename, "ECG@2024-01-15T09:00:00+08:00");
        assert_ne!(records[0].filename, records[1].filename);
        assert_eq!(records[0].average_heart_rate, Some(68.0));
        assert_eq!(records[0].classification.as_deref(), Some("SinusRhythm"));
        assert_eq!(records[0].source, EcgSource::Export);
        assert!(records[0].signal.is_empty());
    }
}
