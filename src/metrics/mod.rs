//! Metric derivation
//!
//! Maps canonical metrics onto their raw type aliases, extracts
//! (timestamp, value) pairs and computes daily aggregates with a
//! metric-specific policy:
//! - steps: daily sum
//! - heart rate, resting heart rate: daily mean
//! - sleep: daily sum of asleep/in-bed hours
//! - stress: composite of daily heart-rate deviation and range

mod aggregate;
mod sleep;

pub use aggregate::{aggregate_daily, bucket_by_date, DailyPolicy, Mean, StressComposite, Sum};
pub use sleep::SleepInterval;

use crate::alias;
use crate::config::LensConfig;
use crate::error::LensError;
use crate::stats;
use crate::store::RecordStore;
use crate::timestamp::{extract_timestamp, extract_value, start_of_day, ExtractedValue};
use crate::types::{
    CanonicalMetric, DailyAggregate, DailyAggregateRow, DailySeries, DailyStress,
    HeartRateStats, MetricSeries, SeriesPoint,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A canonical metric or a raw type identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSelector {
    Metric(CanonicalMetric),
    RawType(String),
}

impl MetricSelector {
    /// Canonical metric this selector denotes, resolving raw aliases
    pub fn canonical(&self, config: &LensConfig) -> Option<CanonicalMetric> {
        match self {
            MetricSelector::Metric(m) => Some(*m),
            MetricSelector::RawType(t) => CanonicalMetric::ALL
                .into_iter()
                .filter(|m| *m != CanonicalMetric::Stress)
                .find(|m| alias::is_alias(t, aliases_for(config, *m))),
        }
    }
}

impl FromStr for MetricSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty metric selector".to_string());
        }
        Ok(match s.parse::<CanonicalMetric>() {
            Ok(metric) => MetricSelector::Metric(metric),
            Err(_) => MetricSelector::RawType(s.to_string()),
        })
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSelector::Metric(m) => write!(f, "{}", m),
            MetricSelector::RawType(t) => f.write_str(t),
        }
    }
}

/// Raw type aliases feeding a canonical metric; stress reads heart rate
pub fn aliases_for(config: &LensConfig, metric: CanonicalMetric) -> &[String] {
    let aliases = &config.metrics;
    match metric {
        CanonicalMetric::Steps => &aliases.steps,
        CanonicalMetric::HeartRate | CanonicalMetric::Stress => &aliases.heart_rate,
        CanonicalMetric::RestingHeartRate => &aliases.resting_heart_rate,
        CanonicalMetric::Sleep => &aliases.sleep,
    }
}

/// Derives series and daily aggregates from one record store
pub struct MetricDeriver<'a> {
    store: &'a RecordStore,
    config: &'a LensConfig,
}

impl<'a> MetricDeriver<'a> {
    pub fn new(store: &'a RecordStore, config: &'a LensConfig) -> Self {
        Self { store, config }
    }

    /// Numeric (timestamp, value) points of every alias, ordered by time.
    ///
    /// Records whose value cannot be coerced stay out of the numeric series.
    fn numeric_points(&self, metric: CanonicalMetric) -> Result<Vec<SeriesPoint>, LensError> {
        let aliases = aliases_for(self.config, metric);
        let fields = &self.config.fields;

        let mut seen = 0usize;
        let mut non_numeric = 0usize;
        let mut points = Vec::new();
        for record in self.store.records_of_types(aliases) {
            seen += 1;
            let value = match extract_value(&record.fields, &fields.value) {
                Some(ExtractedValue::Numeric(v)) => v,
                Some(ExtractedValue::Raw(_)) => {
                    non_numeric += 1;
                    continue;
                }
                None => continue,
            };
            let ts = extract_timestamp(&record.fields, &fields.date);
            points.push(SeriesPoint {
                timestamp: ts.at,
                value,
                estimated: ts.estimated,
            });
        }

        if seen == 0 {
            return Err(LensError::InsufficientData(format!(
                "no {} records",
                metric.label()
            )));
        }
        if non_numeric > 0 {
            tracing::debug!("{}: {} non-numeric values left out", metric, non_numeric);
        }
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    /// Time-ordered series for a metric.
    ///
    /// Sleep points carry hours per interval; stress points carry the daily
    /// index at midnight.
    pub fn series(&self, metric: CanonicalMetric) -> Result<MetricSeries, LensError> {
        let points = match metric {
            CanonicalMetric::Sleep => {
                let (intervals, _) = self.sleep_intervals()?;
                let mut points: Vec<SeriesPoint> = intervals
                    .into_iter()
                    .map(|i| SeriesPoint {
                        timestamp: i.start,
                        value: i.hours,
                        estimated: i.estimated,
                    })
                    .collect();
                points.sort_by_key(|p| p.timestamp);
                points
            }
            CanonicalMetric::Stress => self
                .stress_daily()?
                .into_iter()
                .filter_map(|d| {
                    Some(SeriesPoint {
                        timestamp: start_of_day(d.date)?,
                        value: d.stress_index,
                        estimated: false,
                    })
                })
                .collect(),
            _ => self.numeric_points(metric)?,
        };
        Ok(MetricSeries { metric, points })
    }

    /// One aggregate per calendar date
    pub fn daily(&self, metric: CanonicalMetric) -> Result<DailySeries, LensError> {
        match metric {
            CanonicalMetric::Sleep => self.sleep_daily(),
            _ => {
                let points = self.numeric_points(metric)?;
                let estimated_points = points.iter().filter(|p| p.estimated).count();
                let policy: &dyn DailyPolicy = match metric {
                    CanonicalMetric::Steps => &Sum,
                    CanonicalMetric::Stress => &StressComposite,
                    _ => &Mean,
                };
                let days = aggregate_daily(
                    points.iter().map(|p| (p.timestamp.date_naive(), p.value)),
                    policy,
                );
                if days.is_empty() && metric == CanonicalMetric::Stress {
                    return Err(no_heart_rate_values());
                }
                Ok(DailySeries {
                    metric,
                    days,
                    estimated_points,
                    unfiltered_fallback: false,
                })
            }
        }
    }

    /// Mean, max and min over the whole heart-rate series
    pub fn heart_rate_stats(&self) -> Result<HeartRateStats, LensError> {
        let values: Vec<f64> = self
            .numeric_points(CanonicalMetric::HeartRate)?
            .iter()
            .map(|p| p.value)
            .collect();
        match (stats::mean(&values), stats::max(&values), stats::min(&values)) {
            (Some(mean), Some(max), Some(min)) => Ok(HeartRateStats {
                mean,
                max,
                min,
                samples: values.len(),
            }),
            _ => Err(no_heart_rate_values()),
        }
    }

    fn sleep_intervals(&self) -> Result<(Vec<SleepInterval>, bool), LensError> {
        let aliases = aliases_for(self.config, CanonicalMetric::Sleep);
        let fields = &self.config.fields;

        let mut seen = 0usize;
        let mut intervals = Vec::new();
        for record in self.store.records_of_types(aliases) {
            seen += 1;
            if let Some(interval) = sleep::interval_of(record, fields) {
                intervals.push(interval);
            }
        }
        if seen == 0 {
            return Err(LensError::InsufficientData("no sleep records".to_string()));
        }

        Ok(sleep::filter_states(
            intervals,
            &fields.sleep_states,
            self.config.sleep.state_fallback,
        ))
    }

    /// Hours asleep or in bed per start date
    pub fn sleep_daily(&self) -> Result<DailySeries, LensError> {
        let (intervals, unfiltered_fallback) = self.sleep_intervals()?;
        let estimated_points = intervals.iter().filter(|i| i.estimated).count();
        let days = aggregate_daily(
            intervals.iter().map(|i| (i.start.date_naive(), i.hours)),
            &Sum,
        );
        Ok(DailySeries {
            metric: CanonicalMetric::Sleep,
            days,
            estimated_points,
            unfiltered_fallback,
        })
    }

    /// Per-day stress detail from the heart-rate series
    pub fn stress_daily(&self) -> Result<Vec<DailyStress>, LensError> {
        let points = self.numeric_points(CanonicalMetric::HeartRate)?;
        stress_rows(&points)
    }

    /// Daily values of several metrics side by side.
    ///
    /// Each metric derives independently; failures are returned next to
    /// the aggregate instead of aborting it.
    pub fn daily_aggregate(
        &self,
        metrics: &[CanonicalMetric],
    ) -> (DailyAggregate, Vec<(CanonicalMetric, LensError)>) {
        let mut by_date: BTreeMap<chrono::NaiveDate, BTreeMap<CanonicalMetric, f64>> =
            BTreeMap::new();
        let mut failures = Vec::new();

        for &metric in metrics {
            match self.daily(metric) {
                Ok(series) => {
                    for day in series.days {
                        by_date.entry(day.date).or_default().insert(metric, day.value);
                    }
                }
                Err(e) => {
                    tracing::debug!("{} not derived: {}", metric, e);
                    failures.push((metric, e));
                }
            }
        }

        let rows = by_date
            .into_iter()
            .map(|(date, values)| DailyAggregateRow { date, values })
            .collect();
        (DailyAggregate { rows }, failures)
    }
}

fn stress_rows(heart_rate: &[SeriesPoint]) -> Result<Vec<DailyStress>, LensError> {
    let buckets = bucket_by_date(heart_rate.iter().map(|p| (p.timestamp.date_naive(), p.value)));
    let rows: Vec<DailyStress> = buckets
        .into_iter()
        .filter_map(|(date, values)| StressComposite::detail(date, &values))
        .collect();
    if rows.is_empty() {
        return Err(no_heart_rate_values());
    }
    Ok(rows)
}

fn no_heart_rate_values() -> LensError {
    LensError::InsufficientData("no numeric heart rate values".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldMap, RawRecord};
    use chrono::NaiveDate;

    fn push(store: &mut RecordStore, record_type: &str, pairs: &[(&str, &str)]) {
        let mut fields = FieldMap::new();
        for (k, v) in pairs {
            fields.insert(k.to_string(), (*v).into());
        }
        store.push(RawRecord::new(record_type, fields).unwrap());
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_steps_sum_across_aliases() {
        let mut store = RecordStore::new();
        push(&mut store, "HKQuantityTypeIdentifierStepCount", &[("startDate", "2024-01-15 08:00:00 +0800"), ("value", "100")]);
        push(&mut store, "StepCount", &[("date", "2024-01-15 12:00:00"), ("Value", "200")]);
        push(&mut store, "com.apple.health.type.quantity.steps", &[("Start", "2024-01-15T18:00:00Z"), ("值", "300")]);

        let config = LensConfig::default();
        let daily = MetricDeriver::new(&store, &config)
            .daily(CanonicalMetric::Steps)
            .unwrap();
        assert_eq!(daily.days.len(), 1);
        assert_eq!(daily.days[0].date, date(15));
        assert_eq!(daily.days[0].value, 600.0);
        assert_eq!(daily.estimated_points, 0);
    }

    #[test]
    fn test_heart_rate_stats_and_daily_mean() {
        let mut store = RecordStore::new();
        for (ts, v) in [
            ("2024-01-15 08:00:00", "60"),
            ("2024-01-15 09:00:00", "80"),
            ("2024-01-16 09:00:00", "100"),
            ("2024-01-16 10:00:00", "n/a"),
        ] {
            push(&mut store, "HKQuantityTypeIdentifierHeartRate", &[("startDate", ts), ("value", v)]);
        }

        let config = LensConfig::default();
        let deriver = MetricDeriver::new(&store, &config);
        let stats = deriver.heart_rate_stats().unwrap();
        assert_eq!(stats.samples, 3);
        assert!((stats.mean - 80.0).abs() < 0.001);
        assert_eq!((stats.max, stats.min), (100.0, 60.0));

        let daily = deriver.daily(CanonicalMetric::HeartRate).unwrap();
        assert_eq!(daily.values(), vec![70.0, 100.0]);
    }

    #[test]
    fn test_unparseable_date_is_estimated_not_dropped() {
        let mut store = RecordStore::new();
        push(&mut store, "StepCount", &[("startDate", "someday"), ("value", "42")]);

        let config = LensConfig::default();
        let series = MetricDeriver::new(&store, &config)
            .series(CanonicalMetric::Steps)
            .unwrap();
        assert_eq!(series.points.len(), 1);
        assert!(series.points[0].estimated);
        assert_eq!(series.estimated_points(), 1);
    }

    #[test]
    fn test_stress_daily_bounds() {
        let mut store = RecordStore::new();
        for (ts, v) in [
            ("2024-01-15 08:00:00", "70"),
            ("2024-01-15 09:00:00", "70"),
            ("2024-01-16 08:00:00", "50"),
            ("2024-01-16 12:00:00", "180"),
            ("2024-01-16 18:00:00", "60"),
        ] {
            push(&mut store, "HeartRate", &[("startDate", ts), ("value", v)]);
        }

        let config = LensConfig::default();
        let rows = MetricDeriver::new(&store, &config).stress_daily().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stress_index, 1.0);
        assert!(rows.iter().all(|r| (1.0..=10.0).contains(&r.stress_index)));
        assert!(rows[1].stress_index > 1.0);

        let daily = MetricDeriver::new(&store, &config)
            .daily(CanonicalMetric::Stress)
            .unwrap();
        let detail: Vec<(NaiveDate, f64)> = rows.iter().map(|r| (r.date, r.stress_index)).collect();
        let aggregated: Vec<(NaiveDate, f64)> = daily.days.iter().map(|d| (d.date, d.value)).collect();
        assert_eq!(aggregated, detail);
    }

    #[test]
    fn test_stress_daily_without_numeric_heart_rate() {
        let mut store = RecordStore::new();
        push(&mut store, "HeartRate", &[("startDate", "2024-01-15 08:00:00"), ("value", "n/a")]);

        let config = LensConfig::default();
        let deriver = MetricDeriver::new(&store, &config);
        assert!(matches!(
            deriver.daily(CanonicalMetric::Stress),
            Err(LensError::InsufficientData(_))
        ));
        assert!(matches!(deriver.stress_daily(), Err(LensError::InsufficientData(_))));
    }

    #[test]
    fn test_sleep_daily_uses_start_date() {
        let mut store = RecordStore::new();
        push(&mut store, "HKCategoryTypeIdentifierSleepAnalysis", &[
            ("startDate", "2024-01-15 23:00:00 +0800"),
            ("endDate", "2024-01-16 06:00:00 +0800"),
            ("value", "HKCategoryValueSleepAnalysisAsleepDeep"),
        ]);
        push(&mut store, "HKCategoryTypeIdentifierSleepAnalysis", &[
            ("startDate", "2024-01-15 22:00:00 +0800"),
            ("endDate", "2024-01-15 23:00:00 +0800"),
            ("value", "HKCategoryValueSleepAnalysisAwake"),
        ]);

        let config = LensConfig::default();
        let daily = MetricDeriver::new(&store, &config).sleep_daily().unwrap();
        assert_eq!(daily.days.len(), 1);
        assert_eq!(daily.days[0].date, date(15));
        assert!((daily.days[0].value - 7.0).abs() < 1e-9);
        assert!(!daily.unfiltered_fallback);
    }

    #[test]
    fn test_daily_aggregate_isolates_failures() {
        let mut store = RecordStore::new();
        push(&mut store, "StepCount", &[("startDate", "2024-01-15 08:00:00"), ("value", "1000")]);

        let config = LensConfig::default();
        let (aggregate, failures) = MetricDeriver::new(&store, &config)
            .daily_aggregate(&[CanonicalMetric::Steps, CanonicalMetric::HeartRate]);

        assert_eq!(aggregate.rows.len(), 1);
        assert_eq!(aggregate.rows[0].values[&CanonicalMetric::Steps], 1000.0);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, CanonicalMetric::HeartRate);
    }

    #[test]
    fn test_selector_parsing() {
        let config = LensConfig::default();
        let sel: MetricSelector = "heart_rate".parse().unwrap();
        assert_eq!(sel, MetricSelector::Metric(CanonicalMetric::HeartRate));

        let raw: MetricSelector = "HKQuantityTypeIdentifierStepCount".parse().unwrap();
        assert_eq!(raw.canonical(&config), Some(CanonicalMetric::Steps));

        let other: MetricSelector = "HKQuantityTypeIdentifierBodyMass".parse().unwrap();
        assert_eq!(other.canonical(&config), None);
    }
}
