//! Analysis sessions
//!
//! This module provides the public API for Health Lens. A session resolves
//! an export, ingests it into its own record store and answers queries
//! against that store until it is closed.

use crate::config::LensConfig;
use crate::correlation::CorrelationEngine;
use crate::ecg::EcgParser;
use crate::error::LensError;
use crate::ingest::ingest_groups;
use crate::metrics::{MetricDeriver, MetricSelector};
use crate::source::{find_ecg_directories, Resolution, SourceResolver};
use crate::store::RecordStore;
use crate::summary::HealthSummary;
use crate::types::{
    CanonicalMetric, CorrelationResult, DailyAggregate, DailySeries, DailyStress, EcgRecord,
    HeartRateStats, MetricSeries, RawRecord,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Summarize one export.
///
/// # Arguments
/// * `path` - Archive, directory or single export file
/// * `config` - Effective configuration
///
/// # Example
/// ```ignore
/// let summary = summarize_export(Path::new("export.zip"), LensConfig::default())?;
/// println!("{} records", summary.record_count);
/// ```
pub fn summarize_export(path: &Path, config: LensConfig) -> Result<HealthSummary, LensError> {
    let session = AnalysisSession::open(path, config)?;
    let summary = session.summary();
    session.close()?;
    Ok(summary)
}

/// Correlate two metrics of one export.
///
/// # Example
/// ```ignore
/// let result = correlate_export(
///     Path::new("export.zip"),
///     &"steps".parse()?,
///     &"heart_rate".parse()?,
///     LensConfig::default(),
/// )?;
/// ```
pub fn correlate_export(
    path: &Path,
    x: &MetricSelector,
    y: &MetricSelector,
    config: LensConfig,
) -> Result<CorrelationResult, LensError> {
    let session = AnalysisSession::open(path, config)?;
    let result = session.correlate(x, y);
    session.close()?;
    result
}

/// Per-request owner of one ingested export.
///
/// Extraction directories live as long as the session and are removed when
/// it is dropped; `close` reports removal errors instead.
pub struct AnalysisSession {
    id: Uuid,
    config: LensConfig,
    store: RecordStore,
    bundle_roots: Vec<PathBuf>,
    scratch: Vec<TempDir>,
}

impl AnalysisSession {
    /// Resolve and ingest `path`
    pub fn open(path: &Path, config: LensConfig) -> Result<Self, LensError> {
        config.validate()?;
        let id = Uuid::new_v4();

        // scratch stays local until ingestion succeeds so a failure drops it
        let Resolution {
            groups,
            bundle_root,
            scratch,
        } = SourceResolver::new(&config.source).resolve(path)?;

        let mut store = RecordStore::new();
        let ingested = ingest_groups(&groups, &config.ingest, &mut store)?;

        tracing::info!(
            "session {} opened {}: {} records of {} types",
            id,
            path.display(),
            ingested,
            store.type_counts().len()
        );

        Ok(Self {
            id,
            config,
            store,
            bundle_roots: vec![bundle_root],
            scratch,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &LensConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Directories searched for ECG signal files
    pub fn bundle_roots(&self) -> &[PathBuf] {
        &self.bundle_roots
    }

    /// Type identifier → record count, ordered by type
    pub fn data_types(&self) -> BTreeMap<String, usize> {
        self.store.type_counts()
    }

    /// Raw records of one type, in ingestion order
    pub fn records_of_type(&self, record_type: &str) -> Vec<&RawRecord> {
        self.store.records_of_type(record_type).collect()
    }

    fn deriver(&self) -> MetricDeriver<'_> {
        MetricDeriver::new(&self.store, &self.config)
    }

    pub fn series(&self, metric: CanonicalMetric) -> Result<MetricSeries, LensError> {
        self.deriver().series(metric)
    }

    pub fn daily(&self, metric: CanonicalMetric) -> Result<DailySeries, LensError> {
        self.deriver().daily(metric)
    }

    pub fn heart_rate_stats(&self) -> Result<HeartRateStats, LensError> {
        self.deriver().heart_rate_stats()
    }

    pub fn sleep_daily(&self) -> Result<DailySeries, LensError> {
        self.deriver().sleep_daily()
    }

    pub fn stress_daily(&self) -> Result<Vec<DailyStress>, LensError> {
        self.deriver().stress_daily()
    }

    /// Daily values of several metrics; failing metrics are logged and left out
    pub fn daily_aggregate(&self, metrics: &[CanonicalMetric]) -> DailyAggregate {
        let (aggregate, failures) = self.deriver().daily_aggregate(metrics);
        for (metric, e) in failures {
            tracing::warn!("session {}: {} left out of daily aggregate: {}", self.id, metric, e);
        }
        aggregate
    }

    /// ECG recordings of the bundle.
    ///
    /// Signal files under ECG directories win; when none parse, ECG entries
    /// of the structured export are used instead.
    pub fn ecg_records(&self) -> Vec<EcgRecord> {
        let directories: Vec<PathBuf> = self
            .bundle_roots
            .iter()
            .flat_map(|root| find_ecg_directories(root, &self.config.source))
            .collect();

        let parser = EcgParser::new(&self.config.ecg);
        let records = parser.parse_directories(&directories);
        if !records.is_empty() {
            return records;
        }

        let fallback = parser.from_store(&self.store, &self.config.metrics.ecg, &self.config.fields);
        if !fallback.is_empty() {
            tracing::debug!(
                "session {}: {} ECG entries from the structured export",
                self.id,
                fallback.len()
            );
        }
        fallback
    }

    pub fn correlate(
        &self,
        x: &MetricSelector,
        y: &MetricSelector,
    ) -> Result<CorrelationResult, LensError> {
        CorrelationEngine::new(&self.store, &self.config).correlate(x, y)
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary::build(self.id, &self.store, &self.config, self.ecg_records().len())
    }

    /// Release the session, surfacing scratch removal errors
    pub fn close(self) -> Result<(), LensError> {
        let id = self.id;
        for dir in self.scratch {
            dir.close()?;
        }
        tracing::info!("session {} closed", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultipleExportPolicy;
    use crate::types::EcgSource;
    use std::fs;
    use std::io::Write;
    use zip::write::FileOptions;

    fn export_xml() -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE HealthData>\n<HealthData locale=\"en_US\">\n",
        );
        for d in 1..=5 {
            xml.push_str(&format!(
                "  <Record type=\"HKQuantityTypeIdentifierStepCount\" startDate=\"2024-03-0{d} 08:00:00 +0800\" endDate=\"2024-03-0{d} 09:00:00 +0800\" value=\"{}\"/>\n",
                1000 * d
            ));
            xml.push_str(&format!(
                "  <Record type=\"HKQuantityTypeIdentifierHeartRate\" startDate=\"2024-03-0{d} 08:30:00 +0800\" value=\"{}\"/>\n",
                60 + 5 * d
            ));
        }
        xml.push_str(
            "  <Record type=\"HKCategoryTypeIdentifierSleepAnalysis\" startDate=\"2024-03-01 23:00:00 +0800\" endDate=\"2024-03-02 06:00:00 +0800\" value=\"HKCategoryValueSleepAnalysisAsleepCore\"/>\n",
        );
        xml.push_str("</HealthData>\n");
        xml
    }

    fn ecg_file() -> String {
        "Date,2024-03-02 10:00:00 +0800\nClassification,Sinus Rhythm\nSampling Frequency,512 Hz\n"
            .to_string()
            + &"0.5\n".repeat(20)
    }

    #[test]
    fn test_directory_session() {
        let dir = TempDir::new().unwrap();
        let export = dir.path().join("apple_health_export");
        fs::create_dir_all(export.join("electrocardiograms")).unwrap();
        fs::write(export.join("export.xml"), export_xml()).unwrap();
        fs::write(export.join("electrocardiograms/ecg_2024-03-02.csv"), ecg_file()).unwrap();

        let session = AnalysisSession::open(dir.path(), LensConfig::default()).unwrap();
        let types = session.data_types();
        assert_eq!(types["HKQuantityTypeIdentifierStepCount"], 5);
        assert_eq!(session.records_of_type("HKQuantityTypeIdentifierHeartRate").len(), 5);

        let steps = session.daily(CanonicalMetric::Steps).unwrap();
        assert_eq!(steps.values(), vec![1000.0, 2000.0, 3000.0, 4000.0, 5000.0]);

        let ecg = session.ecg_records();
        assert_eq!(ecg.len(), 1);
        assert_eq!(ecg[0].sample_count, 20);
        assert_eq!(ecg[0].source, EcgSource::SignalFile);

        let result = session
            .correlate(&"steps".parse().unwrap(), &"heart_rate".parse().unwrap())
            .unwrap();
        assert_eq!(result.count, 5);
        assert!((result.pearson - 1.0).abs() < 1e-9);
        assert!(result.interpretation.domain_remark.is_some());

        let aggregate = session.daily_aggregate(&CanonicalMetric::ALL);
        assert_eq!(aggregate.rows.len(), 5);
        assert_eq!(aggregate.rows[0].values[&CanonicalMetric::Sleep], 7.0);

        let summary = session.summary();
        assert_eq!(summary.session_id, session.id());
        assert_eq!(summary.ecg_count, 1);
        assert!(summary.failures.is_empty());

        session.close().unwrap();
    }

    #[test]
    fn test_archive_scratch_removed_on_close() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("export.zip");
        {
            let file = fs::File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("apple_health_export/export.xml", FileOptions::default())
                .unwrap();
            zip.write_all(export_xml().as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let session = AnalysisSession::open(&zip_path, LensConfig::default()).unwrap();
        let scratch_root = session.bundle_roots()[0].clone();
        assert!(scratch_root.exists());
        assert_eq!(session.store().len(), 11);

        session.close().unwrap();
        assert!(!scratch_root.exists());
    }

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn is_empty_dir(path: &Path) -> bool {
        fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_archive_scratch_removed_on_parse_failure() {
        let dir = TempDir::new().unwrap();
        let scratch_parent = TempDir::new().unwrap();
        let zip_path = dir.path().join("export.zip");
        write_zip(&zip_path, &[("apple_health_export/export.xml", "<HealthData></HealthData>")]);

        let mut config = LensConfig::default();
        config.source.scratch_dir = Some(scratch_parent.path().to_path_buf());
        let err = AnalysisSession::open(&zip_path, config).err().unwrap();
        assert!(matches!(err, LensError::ParseFailure(_)));
        assert!(is_empty_dir(scratch_parent.path()));
    }

    #[test]
    fn test_archive_scratch_removed_on_ambiguous_exports() {
        let dir = TempDir::new().unwrap();
        let scratch_parent = TempDir::new().unwrap();
        let zip_path = dir.path().join("export.zip");
        let xml = export_xml();
        write_zip(
            &zip_path,
            &[("first/export.xml", xml.as_str()), ("second/export.xml", xml.as_str())],
        );

        let mut config = LensConfig::default();
        config.source.multiple_exports = MultipleExportPolicy::Reject;
        config.source.scratch_dir = Some(scratch_parent.path().to_path_buf());
        let err = AnalysisSession::open(&zip_path, config).err().unwrap();
        match err {
            LensError::AmbiguousSource(paths) => assert_eq!(paths.len(), 2),
            other => panic!("expected AmbiguousSource, got {other:?}"),
        }
        assert!(is_empty_dir(scratch_parent.path()));
    }

    #[test]
    fn test_archive_scratch_honors_configured_parent() {
        let dir = TempDir::new().unwrap();
        let scratch_parent = TempDir::new().unwrap();
        let zip_path = dir.path().join("export.zip");
        write_zip(&zip_path, &[("export.xml", export_xml().as_str())]);

        let mut config = LensConfig::default();
        config.source.scratch_dir = Some(scratch_parent.path().to_path_buf());
        let session = AnalysisSession::open(&zip_path, config).unwrap();
        assert!(session.bundle_roots()[0].starts_with(scratch_parent.path()));
        assert!(!is_empty_dir(scratch_parent.path()));

        session.close().unwrap();
        assert!(is_empty_dir(scratch_parent.path()));
    }

    #[test]
    fn test_ecg_falls_back_to_export_entries() {
        let dir = TempDir::new().unwrap();
        let xml = "<HealthData>\n  <Record type=\"HKDataTypeIdentifierElectrocardiogram\" startDate=\"2024-03-02 10:00:00 +0800\" classification=\"Sinus Rhythm\" averageHeartRate=\"72\"/>\n</HealthData>\n";
        fs::write(dir.path().join("export.xml"), xml).unwrap();

        let session = AnalysisSession::open(dir.path(), LensConfig::default()).unwrap();
        let ecg = session.ecg_records();
        assert_eq!(ecg.len(), 1);
        assert_eq!(ecg[0].source, EcgSource::Export);
        assert_eq!(ecg[0].average_heart_rate, Some(72.0));
        assert!(ecg[0].signal.is_empty());
    }

    #[test]
    fn test_open_failures() {
        let dir = TempDir::new().unwrap();
        let err = AnalysisSession::open(&dir.path().join("missing.zip"), LensConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, LensError::SourceNotFound(_)));

        fs::write(dir.path().join("export.xml"), "<HealthData></HealthData>").unwrap();
        let err = AnalysisSession::open(dir.path(), LensConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, LensError::ParseFailure(_)));

        let mut config = LensConfig::default();
        config.correlation.min_points = 1;
        let err = AnalysisSession::open(dir.path(), config).err().unwrap();
        assert!(matches!(err, LensError::Config(_)));
    }

    #[test]
    fn test_summarize_export_convenience() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        fs::write(&path, export_xml()).unwrap();

        let summary = summarize_export(&path, LensConfig::default()).unwrap();
        assert_eq!(summary.record_count, 11);
        assert!(summary.steps.is_some());

        let result = correlate_export(
            &path,
            &"steps".parse().unwrap(),
            &"HKQuantityTypeIdentifierBodyMass".parse().unwrap(),
            LensConfig::default(),
        );
        assert!(matches!(result, Err(LensError::InsufficientData(_))));
    }
}
