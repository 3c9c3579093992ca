//! Correlation and regression between two metrics' daily series
//!
//! Both sides are reduced to daily means, inner-joined on date and gated
//! on the number of joined points before any statistic is computed.

use crate::alias;
use crate::config::LensConfig;
use crate::error::LensError;
use crate::metrics::{aliases_for, MetricDeriver, MetricSelector};
use crate::stats;
use crate::store::RecordStore;
use crate::timestamp::parse_timestamp;
use crate::types::{
    CanonicalMetric, CorrelationResult, DailyValue, FieldMap, FieldValue, Interpretation,
    NormalityOutcome, NormalityPair, RawRecord, RegressionFit, ScatterPoint,
};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Synthetic column names for derived daily rows
const DERIVED_DATE_COLUMN: &str = "date";
const DERIVED_VALUE_COLUMN: &str = "value";

pub struct CorrelationEngine<'a> {
    store: &'a RecordStore,
    config: &'a LensConfig,
}

impl<'a> CorrelationEngine<'a> {
    pub fn new(store: &'a RecordStore, config: &'a LensConfig) -> Self {
        Self { store, config }
    }

    /// Compare two metrics; `y` is regressed on `x`
    pub fn correlate(
        &self,
        x: &MetricSelector,
        y: &MetricSelector,
    ) -> Result<CorrelationResult, LensError> {
        let x_daily = self.daily_means(x)?;
        let y_daily = self.daily_means(y)?;

        let points: Vec<ScatterPoint> = x_daily
            .iter()
            .filter_map(|(date, xv)| {
                y_daily.get(date).map(|yv| ScatterPoint {
                    date: *date,
                    x: *xv,
                    y: *yv,
                })
            })
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .collect();

        let gates = &self.config.correlation;
        if points.len() < gates.min_points {
            return Err(LensError::InsufficientData(format!(
                "{} joined days for {} and {}, need at least {}",
                points.len(),
                x,
                y,
                gates.min_points
            )));
        }

        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();

        let pearson = stats::pearson(&xs, &ys).ok_or_else(|| {
            LensError::DegenerateStatistic(format!(
                "correlation of {} and {} is undefined (a side is constant)",
                x, y
            ))
        })?;
        let spearman = stats::spearman(&xs, &ys).unwrap_or(0.0);
        let covariance = stats::covariance(&xs, &ys).unwrap_or(0.0);
        let regression = stats::linear_regression(&xs, &ys)?;

        let normality = if points.len() >= gates.normality_min_points {
            NormalityPair {
                x: self.normality(&xs, x),
                y: self.normality(&ys, y),
            }
        } else {
            NormalityPair::default()
        };

        let descriptive_x = stats::describe(&xs)
            .ok_or_else(|| LensError::InsufficientData(format!("no values for {}", x)))?;
        let descriptive_y = stats::describe(&ys)
            .ok_or_else(|| LensError::InsufficientData(format!("no values for {}", y)))?;

        let interpretation = self.interpret(x, y, pearson, spearman, &regression, &normality);

        tracing::debug!(
            "correlated {} and {} over {} days: r = {:.4}",
            x,
            y,
            points.len(),
            pearson
        );

        Ok(CorrelationResult {
            x: x.to_string(),
            y: y.to_string(),
            pearson,
            spearman,
            covariance,
            regression,
            normality,
            descriptive_x,
            descriptive_y,
            count: points.len(),
            points,
            interpretation,
        })
    }

    fn normality(&self, values: &[f64], side: &MetricSelector) -> Option<NormalityOutcome> {
        match stats::shapiro_wilk(values) {
            Ok((statistic, p_value)) => Some(NormalityOutcome {
                statistic,
                p_value,
                is_normal: p_value > self.config.correlation.significance,
            }),
            Err(e) => {
                tracing::debug!("normality test for {} failed: {}", side, e);
                None
            }
        }
    }

    /// Per-record rows for one side. Sleep and stress (including raw sleep
    /// type identifiers) use their derived daily rows; everything else uses
    /// the raw records of every alias.
    fn rows(&self, selector: &MetricSelector) -> Result<Vec<Cow<'a, FieldMap>>, LensError> {
        let deriver = MetricDeriver::new(self.store, self.config);
        let derived: Option<Vec<DailyValue>> = match selector.canonical(self.config) {
            Some(CanonicalMetric::Stress) => Some(
                deriver
                    .stress_daily()?
                    .into_iter()
                    .map(|d| DailyValue {
                        date: d.date,
                        value: d.stress_index,
                    })
                    .collect(),
            ),
            Some(CanonicalMetric::Sleep) => Some(deriver.sleep_daily()?.days),
            _ => None,
        };

        if let Some(days) = derived {
            return Ok(days
                .into_iter()
                .map(|d| {
                    let mut row = FieldMap::new();
                    row.insert(
                        DERIVED_DATE_COLUMN.to_string(),
                        FieldValue::Text(d.date.to_string()),
                    );
                    row.insert(DERIVED_VALUE_COLUMN.to_string(), FieldValue::Number(d.value));
                    Cow::Owned(row)
                })
                .collect());
        }

        let records: Vec<&'a RawRecord> = match selector {
            MetricSelector::Metric(metric) => self
                .store
                .records_of_types(aliases_for(self.config, *metric))
                .collect(),
            MetricSelector::RawType(t) => self.store.records_of_type(t).collect(),
        };
        Ok(records.into_iter().map(|r| Cow::Borrowed(&r.fields)).collect())
    }

    /// Daily mean of one side after column resolution and coercion.
    ///
    /// Rows without a parseable date or numeric value are dropped; no
    /// timestamp is invented here.
    fn daily_means(&self, selector: &MetricSelector) -> Result<BTreeMap<NaiveDate, f64>, LensError> {
        let rows = self.rows(selector)?;
        if rows.is_empty() {
            return Err(LensError::InsufficientData(format!(
                "no records for {}",
                selector
            )));
        }

        let columns: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();
        let gates = &self.config.correlation;
        let date_column = alias::resolve_column(columns.iter().copied(), &gates.date_columns)
            .ok_or_else(|| {
                LensError::ParseFailure(format!("{} has no recognizable date column", selector))
            })?;
        let value_column = alias::resolve_column(columns.iter().copied(), &gates.value_columns)
            .ok_or_else(|| {
                LensError::ParseFailure(format!("{} has no recognizable value column", selector))
            })?;

        let mut dropped = 0usize;
        let pairs: Vec<(NaiveDate, f64)> = rows
            .iter()
            .filter_map(|row| {
                let date = row
                    .get(&date_column)
                    .and_then(|v| parse_timestamp(&v.as_text()).ok())
                    .map(|ts| ts.date_naive());
                let value = row.get(&value_column).and_then(|v| v.to_number().ok());
                match (date, value) {
                    (Some(d), Some(v)) => Some((d, v)),
                    _ => {
                        dropped += 1;
                        None
                    }
                }
            })
            .collect();

        if dropped > 0 {
            tracing::debug!("{}: {} rows without a usable date or value", selector, dropped);
        }

        Ok(crate::metrics::bucket_by_date(pairs)
            .into_iter()
            .filter_map(|(date, values)| stats::mean(&values).map(|m| (date, m)))
            .collect())
    }

    fn interpret(
        &self,
        x: &MetricSelector,
        y: &MetricSelector,
        pearson: f64,
        spearman: f64,
        regression: &RegressionFit,
        normality: &NormalityPair,
    ) -> Interpretation {
        let significance = self.config.correlation.significance;
        let x_label = self.label(x);
        let y_label = self.label(y);

        let strength = format!("{} ({})", strength_band(pearson), direction(pearson));
        let summary = format!(
            "The correlation coefficient is {:.4}, a {}. It ranges from -1 to 1; values near \u{b1}1 indicate a strong relationship, values near 0 a weak or absent one.",
            pearson, strength
        );

        let regression_text = if regression.p_value < significance {
            let trend = if regression.slope >= 0.0 {
                format!("increases by {:.4}", regression.slope)
            } else {
                format!("decreases by {:.4}", regression.slope.abs())
            };
            format!(
                "y = {:.4}x + {:.4} (p = {:.4}) is statistically significant: {:.2}% of the variation in {} is explained by {}. Each additional unit of {} {} units of {} on average.",
                regression.slope,
                regression.intercept,
                regression.p_value,
                regression.r_squared * 100.0,
                y_label,
                x_label,
                x_label,
                trend,
                y_label
            )
        } else {
            format!(
                "y = {:.4}x + {:.4} (p = {:.4}) is not statistically significant; {} cannot be said to predict {}.",
                regression.slope, regression.intercept, regression.p_value, x_label, y_label
            )
        };

        let domain_remark = domain_remark(
            x.canonical(self.config),
            y.canonical(self.config),
            pearson,
        )
        .map(str::to_string);

        let non_normal = [normality.x, normality.y]
            .iter()
            .flatten()
            .any(|n| n.p_value <= significance);
        let method_suggestion = non_normal.then(|| {
            format!(
                "At least one variable is not normally distributed, so the Spearman coefficient ({:.4}) may describe this relationship better than Pearson's.",
                spearman
            )
        });

        Interpretation {
            strength,
            summary,
            regression: regression_text,
            domain_remark,
            method_suggestion,
        }
    }

    fn label(&self, selector: &MetricSelector) -> String {
        match selector {
            MetricSelector::Metric(m) => m.label().to_string(),
            MetricSelector::RawType(t) => t.clone(),
        }
    }
}

/// Strength band of |r|
pub fn strength_band(r: f64) -> &'static str {
    let a = r.abs();
    if a < 0.1 {
        "no correlation"
    } else if a < 0.3 {
        "weak correlation"
    } else if a < 0.5 {
        "moderate correlation"
    } else if a < 0.7 {
        "strong correlation"
    } else {
        "very strong correlation"
    }
}

fn direction(r: f64) -> &'static str {
    if r >= 0.0 {
        "positive"
    } else {
        "negative"
    }
}

/// Remarks for well-known metric pairs
fn domain_remark(
    x: Option<CanonicalMetric>,
    y: Option<CanonicalMetric>,
    r: f64,
) -> Option<&'static str> {
    use CanonicalMetric::*;

    match (x?, y?) {
        (Steps, HeartRate) if r > 0.3 => Some(
            "More steps going with a higher heart rate reflects increased physical activity raising heart rate, a normal physiological response.",
        ),
        (Steps, HeartRate) if r < -0.3 => Some(
            "More steps going with a lower heart rate may point to good cardiorespiratory fitness, or to a timing mismatch in the data.",
        ),
        (Steps, RestingHeartRate) | (RestingHeartRate, Steps) if r < -0.3 => Some(
            "More steps going with a lower resting heart rate suggests regular exercise may be improving cardiovascular health, a positive sign.",
        ),
        (Sleep, Steps) | (Steps, Sleep) if r > 0.3 => Some(
            "Longer sleep going with more steps suggests adequate sleep may support higher daytime activity.",
        ),
        _ => None,
    }
}
