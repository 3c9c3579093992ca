//! Daily aggregation policies
//!
//! Values are bucketed by calendar date in an ordered map, then each bucket
//! is reduced by a [`DailyPolicy`].

use crate::stats;
use crate::types::{DailyStress, DailyValue};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Reduces one day's values to a single aggregate
pub trait DailyPolicy {
    fn aggregate(&self, values: &[f64]) -> Option<f64>;
}

/// Daily total (step count, sleep hours)
pub struct Sum;

impl DailyPolicy for Sum {
    fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum())
    }
}

/// Daily mean (heart rate, resting heart rate)
pub struct Mean;

impl DailyPolicy for Mean {
    fn aggregate(&self, values: &[f64]) -> Option<f64> {
        stats::mean(values)
    }
}

/// Composite stress index from one day of heart-rate samples
pub struct StressComposite;

impl StressComposite {
    pub const STD_WEIGHT: f64 = 0.6;
    pub const RANGE_WEIGHT: f64 = 0.4;
    pub const SCALE: f64 = 10.0;
    pub const MIN: f64 = 1.0;
    pub const MAX: f64 = 10.0;

    /// Index from the spread of one day's samples, clamped to `[MIN, MAX]`
    pub fn index(hr_std: f64, hr_range: f64) -> f64 {
        let raw = (hr_std * Self::STD_WEIGHT + hr_range * Self::RANGE_WEIGHT) / Self::SCALE;
        zero_if_undefined(Some(raw)).clamp(Self::MIN, Self::MAX)
    }

    /// Full detail row for one day
    pub fn detail(date: NaiveDate, values: &[f64]) -> Option<DailyStress> {
        let (hr_mean, hr_std, hr_range) = spread(values)?;
        Some(DailyStress {
            date,
            hr_std,
            hr_range,
            hr_mean,
            stress_index: Self::index(hr_std, hr_range),
        })
    }
}

impl DailyPolicy for StressComposite {
    fn aggregate(&self, values: &[f64]) -> Option<f64> {
        let (_, hr_std, hr_range) = spread(values)?;
        Some(Self::index(hr_std, hr_range))
    }
}

/// Mean, sample std and range; undefined spreads count as zero
fn spread(values: &[f64]) -> Option<(f64, f64, f64)> {
    let mean = stats::mean(values)?;
    let std = zero_if_undefined(stats::sample_std(values));
    let range = zero_if_undefined(
        stats::max(values).zip(stats::min(values)).map(|(hi, lo)| hi - lo),
    );
    Some((mean, std, range))
}

fn zero_if_undefined(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Bucket (date, value) pairs by date
pub fn bucket_by_date<I>(points: I) -> BTreeMap<NaiveDate, Vec<f64>>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut buckets: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for (date, value) in points {
        buckets.entry(date).or_default().push(value);
    }
    buckets
}

/// Aggregate (date, value) pairs into one value per date, ordered by date
pub fn aggregate_daily<I>(points: I, policy: &dyn DailyPolicy) -> Vec<DailyValue>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    bucket_by_date(points)
        .into_iter()
        .filter_map(|(date, values)| {
            policy
                .aggregate(&values)
                .map(|value| DailyValue { date, value })
        })
        .collect()
}
