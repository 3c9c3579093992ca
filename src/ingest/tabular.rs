//! Tabular ingestor
//!
//! The whole file is decoded with each configured encoding in turn, never
//! partially, then read as CSV. A table is only accepted when its header
//! shares at least one column with the known health columns.

use super::RecordIngestor;
use crate::config::IngestConfig;
use crate::error::LensError;
use crate::store::RecordStore;
use crate::text::decode_with_fallback;
use crate::types::{FieldMap, FieldValue, RawRecord};
use std::path::Path;

pub struct TabularIngestor<'a> {
    config: &'a IngestConfig,
}

impl<'a> TabularIngestor<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    pub fn ingest_bytes(
        &self,
        bytes: &[u8],
        name: &str,
        store: &mut RecordStore,
    ) -> Result<usize, LensError> {
        let (text, _) = decode_with_fallback(bytes, &self.config.tabular_encodings, name)?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| LensError::ParseFailure(format!("{}: {}", name, e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if !headers
            .iter()
            .any(|h| self.config.health_columns.iter().any(|c| c == h))
        {
            return Err(LensError::ParseFailure(format!(
                "{}: header has none of the columns {:?}",
                name, self.config.health_columns
            )));
        }

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for row in reader.records() {
            let row = row.map_err(|e| LensError::ParseFailure(format!("{}: {}", name, e)))?;
            let mut fields = FieldMap::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                if !cell.trim().is_empty() {
                    fields.insert(header.clone(), FieldValue::Text(cell.to_string()));
                }
            }
            match RawRecord::from_fields(fields, &self.config.type_field) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::debug!("{}: {} rows without a type dropped", name, dropped);
        }
        let count = records.len();
        for record in records {
            store.push(record);
        }
        if count == 0 {
            return Err(LensError::ParseFailure(format!("{}: no typed rows", name)));
        }
        Ok(count)
    }
}

impl RecordIngestor for TabularIngestor<'_> {
    fn ingest(&self, path: &Path, store: &mut RecordStore) -> Result<usize, LensError> {
        let bytes = std::fs::read(path)?;
        self.ingest_bytes(&bytes, &path.display().to_string(), store)
    }
}
