//! Health summary
//!
//! Overview of one store: each metric reports only what derived
//! successfully, and failures are listed next to the results.

use crate::config::LensConfig;
use crate::error::LensError;
use crate::metrics::MetricDeriver;
use crate::stats;
use crate::store::RecordStore;
use crate::types::{CanonicalMetric, HeartRateStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Heart-rate status from the mean over the whole series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartRateStatus {
    Low,
    Normal,
    High,
}

impl HeartRateStatus {
    pub const HIGH_ABOVE: f64 = 100.0;
    pub const LOW_BELOW: f64 = 60.0;

    pub fn classify(mean: f64) -> Self {
        if mean > Self::HIGH_ABOVE {
            HeartRateStatus::High
        } else if mean < Self::LOW_BELOW {
            HeartRateStatus::Low
        } else {
            HeartRateStatus::Normal
        }
    }
}

/// Activity level from the mean daily step count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Low,
    Moderate,
    ModeratelyHigh,
    High,
}

impl ActivityLevel {
    pub fn classify(daily_mean: f64) -> Self {
        if daily_mean >= 10_000.0 {
            ActivityLevel::High
        } else if daily_mean >= 7_500.0 {
            ActivityLevel::ModeratelyHigh
        } else if daily_mean >= 5_000.0 {
            ActivityLevel::Moderate
        } else {
            ActivityLevel::Low
        }
    }
}

/// Sleep status from mean nightly hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStatus {
    Insufficient,
    Normal,
    Excessive,
}

impl SleepStatus {
    pub fn classify(mean_hours: f64) -> Self {
        if mean_hours < 6.0 {
            SleepStatus::Insufficient
        } else if mean_hours > 9.0 {
            SleepStatus::Excessive
        } else {
            SleepStatus::Normal
        }
    }
}

/// Stress level from the mean daily index; `High` only above 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

impl StressLevel {
    pub fn classify(mean_index: f64) -> Self {
        if mean_index < 5.0 {
            StressLevel::Low
        } else if mean_index > 10.0 {
            StressLevel::High
        } else {
            StressLevel::Moderate
        }
    }
}

/// Mean, max and min over daily values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRange {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub days: usize,
}

impl DailyRange {
    fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: stats::mean(values)?,
            max: stats::max(values)?,
            min: stats::min(values)?,
            days: values.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSummary {
    #[serde(flatten)]
    pub stats: HeartRateStats,
    pub status: HeartRateStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepsSummary {
    pub total: f64,
    pub daily: DailyRange,
    pub activity_level: ActivityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSummary {
    pub daily_hours: DailyRange,
    pub status: SleepStatus,
    /// Every sleep record was used because none matched a sleep state
    pub unfiltered_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressSummary {
    pub mean_index: f64,
    pub days: usize,
    pub level: StressLevel,
}

/// A metric that could not be derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFailure {
    pub metric: CanonicalMetric,
    pub code: String,
    pub message: String,
}

impl MetricFailure {
    fn new(metric: CanonicalMetric, error: &LensError) -> Self {
        Self {
            metric,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub session_id: Uuid,
    pub record_count: usize,
    pub type_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<HeartRateSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<StepsSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep: Option<SleepSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<StressSummary>,
    pub ecg_count: usize,
    pub failures: Vec<MetricFailure>,
}

impl HealthSummary {
    /// Summarize a store; `ecg_count` comes from the caller's ECG discovery
    pub fn build(
        session_id: Uuid,
        store: &RecordStore,
        config: &LensConfig,
        ecg_count: usize,
    ) -> Self {
        let deriver = MetricDeriver::new(store, config);
        let mut failures = Vec::new();

        let heart_rate = record(
            CanonicalMetric::HeartRate,
            deriver.heart_rate_stats().map(|stats| HeartRateSummary {
                status: HeartRateStatus::classify(stats.mean),
                stats,
            }),
            &mut failures,
        );

        let steps = record(
            CanonicalMetric::Steps,
            deriver.daily(CanonicalMetric::Steps).and_then(|series| {
                let values = series.values();
                let daily = DailyRange::of(&values)
                    .ok_or_else(|| no_days(CanonicalMetric::Steps))?;
                Ok(StepsSummary {
                    total: values.iter().sum(),
                    activity_level: ActivityLevel::classify(daily.mean),
                    daily,
                })
            }),
            &mut failures,
        );

        let sleep = record(
            CanonicalMetric::Sleep,
            deriver.sleep_daily().and_then(|series| {
                let daily_hours = DailyRange::of(&series.values())
                    .ok_or_else(|| no_days(CanonicalMetric::Sleep))?;
                Ok(SleepSummary {
                    status: SleepStatus::classify(daily_hours.mean),
                    daily_hours,
                    unfiltered_fallback: series.unfiltered_fallback,
                })
            }),
            &mut failures,
        );

        let stress = record(
            CanonicalMetric::Stress,
            deriver.stress_daily().and_then(|rows| {
                let indices: Vec<f64> = rows.iter().map(|r| r.stress_index).collect();
                let mean_index =
                    stats::mean(&indices).ok_or_else(|| no_days(CanonicalMetric::Stress))?;
                Ok(StressSummary {
                    mean_index,
                    days: indices.len(),
                    level: StressLevel::classify(mean_index),
                })
            }),
            &mut failures,
        );

        Self {
            session_id,
            record_count: store.len(),
            type_counts: store.type_counts(),
            heart_rate,
            steps,
            sleep,
            stress,
            ecg_count,
            failures,
        }
    }
}

fn record<T>(
    metric: CanonicalMetric,
    outcome: Result<T, LensError>,
    failures: &mut Vec<MetricFailure>,
) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("summary: {} unavailable: {}", metric, e);
            failures.push(MetricFailure::new(metric, &e));
            None
        }
    }
}

fn no_days(metric: CanonicalMetric) -> LensError {
    LensError::InsufficientData(format!("no daily {} values", metric.label()))
}
