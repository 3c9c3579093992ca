//! Engine configuration
//!
//! Every alias table and threshold the engine consults lives here, so a
//! deployment can adapt to a new vendor spelling without code changes.
//! Configuration is read from TOML; missing keys fall back to the built-in
//! defaults.

use crate::error::LensError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a TOML configuration file
pub const CONFIG_ENV_VAR: &str = "HEALTH_LENS_CONFIG";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// What to do when a bundle contains more than one structured export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleExportPolicy {
    /// Keep the shallowest, then lexicographically first, match
    #[default]
    First,
    /// Fail with `AmbiguousSource`
    Reject,
}

/// What to do when no sleep record carries an asleep/in-bed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStateFallback {
    /// Use every sleep record and flag the result
    #[default]
    UseAll,
    /// Yield no sleep days
    Strict,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub source: SourceConfig,
    pub ingest: IngestConfig,
    pub fields: FieldAliases,
    pub metrics: MetricAliases,
    pub ecg: EcgConfig,
    pub correlation: CorrelationConfig,
    pub sleep: SleepConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// File names accepted as the structured export (exact match)
    pub export_file_names: Vec<String>,
    /// Directory names holding ECG signal files
    pub ecg_directory_names: Vec<String>,
    pub multiple_exports: MultipleExportPolicy,
    /// Parent directory for archive extraction; the system temp dir if unset
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            export_file_names: strings(&["export.xml", "輸出.xml"]),
            ecg_directory_names: strings(&["electrocardiograms"]),
            multiple_exports: MultipleExportPolicy::First,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Element name of one record in the structured export
    pub record_element: String,
    /// Field carrying the type identifier in object-array and tabular input
    pub type_field: String,
    /// Whole-file decoding attempts for tabular input, in order
    pub tabular_encodings: Vec<String>,
    /// A tabular header must contain at least one of these columns
    pub health_columns: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            record_element: "Record".to_string(),
            type_field: "type".to_string(),
            tabular_encodings: strings(&["utf-8", "windows-1252"]),
            health_columns: strings(&["type", "startDate", "endDate", "value"]),
        }
    }
}

/// Field-name alias lists, evaluated first hit wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldAliases {
    pub date: Vec<String>,
    pub end_date: Vec<String>,
    pub value: Vec<String>,
    /// Explicit sleep duration in hours
    pub duration: Vec<String>,
    /// Sleep state substrings accepted as asleep or in bed
    pub sleep_states: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            date: strings(&["startDate", "endDate", "date", "日期", "Start", "End"]),
            end_date: strings(&["endDate", "End"]),
            value: strings(&["value", "Value", "值", "数值"]),
            duration: strings(&["duration", "Duration"]),
            sleep_states: strings(&["asleep", "inBed", "入睡", "睡眠"]),
        }
    }
}

/// Raw type identifiers accepted for each canonical metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricAliases {
    pub steps: Vec<String>,
    pub heart_rate: Vec<String>,
    pub resting_heart_rate: Vec<String>,
    pub sleep: Vec<String>,
    pub ecg: Vec<String>,
}

impl Default for MetricAliases {
    fn default() -> Self {
        Self {
            steps: strings(&[
                "HKQuantityTypeIdentifierStepCount",
                "com.apple.health.type.quantity.steps",
                "StepCount",
            ]),
            heart_rate: strings(&[
                "HKQuantityTypeIdentifierHeartRate",
                "com.apple.health.type.quantity.heartrate",
                "HeartRate",
            ]),
            resting_heart_rate: strings(&[
                "HKQuantityTypeIdentifierRestingHeartRate",
                "com.apple.health.type.quantity.restingheartrate",
                "RestingHeartRate",
            ]),
            sleep: strings(&[
                "HKCategoryTypeIdentifierSleepAnalysis",
                "com.apple.health.type.category.sleep",
                "SleepAnalysis",
            ]),
            ecg: strings(&[
                "HKDataTypeIdentifierElectrocardiogram",
                "com.apple.health.type.electrocardiogram",
                "ElectrocardiogramData",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgConfig {
    /// Decoding attempts for signal files, in order
    pub encodings: Vec<String>,
    pub date_keys: Vec<String>,
    pub classification_keys: Vec<String>,
    pub device_keys: Vec<String>,
    pub sampling_rate_keys: Vec<String>,
    /// Fields read from ECG entries of the structured export
    pub export_classification_fields: Vec<String>,
    pub export_heart_rate_fields: Vec<String>,
}

impl Default for EcgConfig {
    fn default() -> Self {
        Self {
            encodings: strings(&["utf-8", "gb18030", "big5", "windows-1252"]),
            date_keys: strings(&["記錄日期", "记录日期", "Date"]),
            classification_keys: strings(&["分類", "分类", "Classification"]),
            device_keys: strings(&["裝置", "设备", "Device"]),
            sampling_rate_keys: strings(&["取樣頻率", "采样频率", "Sampling Frequency"]),
            export_classification_fields: strings(&["classification", "Classification"]),
            export_heart_rate_fields: strings(&["averageHeartRate", "heartRate"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Date column names, matched case-insensitively
    pub date_columns: Vec<String>,
    /// Value column names, matched case-insensitively
    pub value_columns: Vec<String>,
    pub min_points: usize,
    pub normality_min_points: usize,
    pub significance: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            date_columns: strings(&["startDate", "date", "日期", "start"]),
            value_columns: strings(&["value", "values", "值", "数值"]),
            min_points: 3,
            normality_min_points: 8,
            significance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    pub state_fallback: SleepStateFallback,
}

impl LensConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, LensError> {
        let config: LensConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, LensError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LensError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolve configuration: explicit path, then `HEALTH_LENS_CONFIG`,
    /// then built-in defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, LensError> {
        if let Some(path) = explicit {
            tracing::debug!("loading configuration from {}", path.display());
            return Self::from_file(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                tracing::debug!(
                    "loading configuration from {} ({})",
                    path.display(),
                    CONFIG_ENV_VAR
                );
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), LensError> {
        if self.correlation.min_points < 3 {
            return Err(LensError::Config(
                "correlation.min_points must be at least 3".to_string(),
            ));
        }
        if !(self.correlation.significance > 0.0 && self.correlation.significance < 1.0) {
            return Err(LensError::Config(
                "correlation.significance must be within (0, 1)".to_string(),
            ));
        }
        if self.ingest.record_element.trim().is_empty() {
            return Err(LensError::Config(
                "ingest.record_element must not be empty".to_string(),
            ));
        }
        for label in self
            .ingest
            .tabular_encodings
            .iter()
            .chain(self.ecg.encodings.iter())
        {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(LensError::Config(format!("unknown encoding: {}", label)));
            }
        }
        Ok(())
    }
}
