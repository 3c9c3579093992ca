//! Streaming ingestors
//!
//! Each ingestor parses one file format and appends records to a shared
//! [`RecordStore`]. The orchestrator tries candidate groups in priority
//! order and stops at the first group that produced records.

mod markup;
mod object_array;
mod tabular;

pub use markup::MarkupIngestor;
pub use object_array::ObjectArrayIngestor;
pub use tabular::TabularIngestor;

use crate::config::IngestConfig;
use crate::error::LensError;
use crate::source::{CandidateGroup, SourceKind};
use crate::store::RecordStore;
use std::path::Path;

/// Trait for format ingestors
pub trait RecordIngestor {
    /// Parse one file and append its records; returns the number appended
    fn ingest(&self, path: &Path, store: &mut RecordStore) -> Result<usize, LensError>;
}

fn ingestor_for<'a>(kind: SourceKind, config: &'a IngestConfig) -> Box<dyn RecordIngestor + 'a> {
    match kind {
        SourceKind::Markup => Box::new(MarkupIngestor::new(config)),
        SourceKind::ObjectArray => Box::new(ObjectArrayIngestor::new(config)),
        SourceKind::Tabular => Box::new(TabularIngestor::new(config)),
    }
}

/// Ingest candidate groups in order into `store`.
///
/// A failing file is skipped with a warning. Succeeds only if at least one
/// record was produced.
pub fn ingest_groups(
    groups: &[CandidateGroup],
    config: &IngestConfig,
    store: &mut RecordStore,
) -> Result<usize, LensError> {
    for group in groups {
        let ingestor = ingestor_for(group.kind, config);
        let mut produced = 0;

        for file in &group.files {
            match ingestor.ingest(file, store) {
                Ok(count) => {
                    tracing::debug!("ingested {} records from {}", count, file.display());
                    produced += count;
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {}", file.display(), e);
                }
            }
        }

        if produced > 0 {
            return Ok(produced);
        }
        tracing::debug!("{:?} candidates produced no records", group.kind);
    }

    Err(LensError::ParseFailure(
        "no records could be ingested from any candidate file".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_falls_through_empty_groups() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("a.json");
        fs::write(&json, r#"{"not": "an array"}"#).unwrap();
        let broken = dir.path().join("b.json");
        fs::write(&broken, "[{").unwrap();
        let csv = dir.path().join("c.csv");
        fs::write(&csv, "type,startDate,value\nStepCount,2024-01-15,100\n").unwrap();

        let groups = vec![
            CandidateGroup {
                kind: SourceKind::ObjectArray,
                files: vec![json, broken],
            },
            CandidateGroup {
                kind: SourceKind::Tabular,
                files: vec![csv],
            },
        ];

        let mut store = RecordStore::new();
        let count = ingest_groups(&groups, &IngestConfig::default(), &mut store).unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.records_of_type("StepCount").count(), 1);
    }

    #[test]
    fn test_nothing_ingested_is_parse_failure() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("notes.csv");
        fs::write(&csv, "name,comment\nx,y\n").unwrap();

        let groups = vec![CandidateGroup {
            kind: SourceKind::Tabular,
            files: vec![csv],
        }];
        let mut store = RecordStore::new();
        let err = ingest_groups(&groups, &IngestConfig::default(), &mut store).unwrap_err();
        assert!(matches!(err, LensError::ParseFailure(_)));
        assert!(store.is_empty());
    }
}
