//! Core types for the Health Lens engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: raw records, metric series, daily aggregates, ECG recordings and
//! correlation output.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timestamp carried through the engine, always with an explicit offset
pub type Timestamp = DateTime<FixedOffset>;

/// Field name → raw value mapping of one ingested record
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Raw field value as found in the export (attribute, cell or JSON scalar)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Text(String),
}

/// Reason a raw value could not be coerced to a number
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("not numeric: {0:?}")]
    NotNumeric(String),

    #[error("non-finite value")]
    NonFinite,
}

impl FieldValue {
    /// Textual form of the value
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Integer(i) => Cow::Owned(i.to_string()),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Boolean(b) => Cow::Owned(b.to_string()),
        }
    }

    /// Blank text counts as an absent field
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    /// Coerce to a finite float
    pub fn to_number(&self) -> Result<f64, CoercionError> {
        let n = match self {
            FieldValue::Integer(i) => *i as f64,
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| CoercionError::NotNumeric(s.clone()))?,
            FieldValue::Boolean(b) => return Err(CoercionError::NotNumeric(b.to_string())),
        };
        if n.is_finite() {
            Ok(n)
        } else {
            Err(CoercionError::NonFinite)
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

/// One ingested observation: a type identifier plus its raw fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Raw type identifier (e.g. "HKQuantityTypeIdentifierStepCount")
    #[serde(rename = "type")]
    pub record_type: String,
    /// All fields of the record, including the type field itself
    pub fields: FieldMap,
}

impl RawRecord {
    /// Build a record, refusing an empty or blank type identifier
    pub fn new(record_type: impl Into<String>, fields: FieldMap) -> Option<Self> {
        let record_type = record_type.into();
        let trimmed = record_type.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            record_type: trimmed.to_string(),
            fields,
        })
    }

    /// Build a record from a field map, reading the type from `type_field`
    pub fn from_fields(fields: FieldMap, type_field: &str) -> Option<Self> {
        let record_type = match fields.get(type_field) {
            Some(FieldValue::Text(t)) => t.clone(),
            _ => return None,
        };
        Self::new(record_type, fields)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Canonical metric unified across raw type aliases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalMetric {
    Steps,
    HeartRate,
    RestingHeartRate,
    Sleep,
    Stress,
}

impl CanonicalMetric {
    pub const ALL: [CanonicalMetric; 5] = [
        CanonicalMetric::Steps,
        CanonicalMetric::HeartRate,
        CanonicalMetric::RestingHeartRate,
        CanonicalMetric::Sleep,
        CanonicalMetric::Stress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalMetric::Steps => "steps",
            CanonicalMetric::HeartRate => "heart_rate",
            CanonicalMetric::RestingHeartRate => "resting_heart_rate",
            CanonicalMetric::Sleep => "sleep",
            CanonicalMetric::Stress => "stress",
        }
    }

    /// Human-readable label used in generated interpretation text
    pub fn label(&self) -> &'static str {
        match self {
            CanonicalMetric::Steps => "step count",
            CanonicalMetric::HeartRate => "heart rate",
            CanonicalMetric::RestingHeartRate => "resting heart rate",
            CanonicalMetric::Sleep => "sleep duration",
            CanonicalMetric::Stress => "stress index",
        }
    }
}

impl fmt::Display for CanonicalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "steps" | "step_count" | "stepcount" => Ok(CanonicalMetric::Steps),
            "heart_rate" | "heartrate" | "hr" => Ok(CanonicalMetric::HeartRate),
            "resting_heart_rate" | "restingheartrate" | "rhr" => {
                Ok(CanonicalMetric::RestingHeartRate)
            }
            "sleep" | "sleep_duration" | "sleepanalysis" => Ok(CanonicalMetric::Sleep),
            "stress" | "stress_index" => Ok(CanonicalMetric::Stress),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

/// One point of a metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub value: f64,
    /// Timestamp is the current-time fallback, not a parsed value
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub estimated: bool,
}

/// Time-ordered series of one canonical metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: CanonicalMetric,
    pub points: Vec<SeriesPoint>,
}

impl MetricSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn estimated_points(&self) -> usize {
        self.points.iter().filter(|p| p.estimated).count()
    }
}

/// One aggregated value for one calendar date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Daily aggregates of one canonical metric, ordered by date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySeries {
    pub metric: CanonicalMetric,
    pub days: Vec<DailyValue>,
    /// Points whose timestamp fell back to the current time
    pub estimated_points: usize,
    /// Sleep only: the state filter matched nothing and all records were used
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unfiltered_fallback: bool,
}

impl DailySeries {
    pub fn values(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.value).collect()
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.days.iter().find(|d| d.date == date).map(|d| d.value)
    }
}

/// Whole-series heart rate statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub samples: usize,
}

/// Per-day stress detail derived from heart rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyStress {
    pub date: NaiveDate,
    /// Sample standard deviation of heart rate (0 when undefined)
    pub hr_std: f64,
    /// max - min of heart rate
    pub hr_range: f64,
    pub hr_mean: f64,
    /// Composite index clamped to [1, 10]
    pub stress_index: f64,
}

/// One row of a combined daily aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregateRow {
    pub date: NaiveDate,
    pub values: BTreeMap<CanonicalMetric, f64>,
}

/// Calendar date → one value per canonical metric
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub rows: Vec<DailyAggregateRow>,
}

/// Where an ECG record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcgSource {
    /// Dedicated signal-export text file
    SignalFile,
    /// ECG entry of the main structured export (no samples)
    Export,
}

/// One electrocardiogram recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgRecord {
    /// Signal file name, or `<sourceName or type>@<start date>` for export entries
    pub filename: String,
    pub timestamp: Timestamp,
    pub classification: Option<String>,
    pub device: Option<String>,
    pub sampling_rate_hz: Option<f64>,
    pub average_heart_rate: Option<f64>,
    /// Samples in file order
    pub signal: Vec<f64>,
    pub sample_count: usize,
    pub source: EcgSource,
}

/// Descriptive statistics of one joined variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Ordinary least squares fit of y on x
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
    pub r_squared: f64,
    /// Two-sided p-value for a zero slope
    pub p_value: f64,
    /// Standard error of the slope
    pub std_err: f64,
}

/// Shapiro-Wilk outcome for one variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalityOutcome {
    pub statistic: f64,
    pub p_value: f64,
    pub is_normal: bool,
}

/// Per-variable normality outcomes; `None` when not attempted or failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalityPair {
    pub x: Option<NormalityOutcome>,
    pub y: Option<NormalityOutcome>,
}

/// Joined point of the scatter series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub date: NaiveDate,
    pub x: f64,
    pub y: f64,
}

/// Generated plain-language text for a correlation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    /// Strength band with sign, e.g. "strong correlation (positive)"
    pub strength: String,
    pub summary: String,
    pub regression: String,
    pub domain_remark: Option<String>,
    pub method_suggestion: Option<String>,
}

/// Full bivariate comparison of two metrics' daily series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub x: String,
    pub y: String,
    pub pearson: f64,
    pub spearman: f64,
    pub covariance: f64,
    pub regression: RegressionFit,
    pub normality: NormalityPair,
    pub descriptive_x: DescriptiveStats,
    pub descriptive_y: DescriptiveStats,
    pub points: Vec<ScatterPoint>,
    pub count: usize,
    pub interpretation: Interpretation,
}
