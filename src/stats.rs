//! Descriptive and inferential statistics
//!
//! Conventions: standard deviation and covariance are sample statistics
//! (n - 1 denominator); ranks are 1-based with ties averaged. Functions
//! return `None` when a statistic is undefined for the input.

use crate::error::LensError;
use crate::types::{DescriptiveStats, RegressionFit};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

const TINY: f64 = 1.0e-20;

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

pub fn median(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn min(xs: &[f64]) -> Option<f64> {
    xs.iter().copied().reduce(f64::min)
}

pub fn max(xs: &[f64]) -> Option<f64> {
    xs.iter().copied().reduce(f64::max)
}

/// Sample standard deviation; undefined below two values
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / (xs.len() - 1) as f64).sqrt())
}

pub fn covariance(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let s: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    Some(s / (xs.len() - 1) as f64)
}

/// Pearson coefficient; `None` when either side has zero variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    r.is_finite().then_some(r)
}

/// 1-based ranks with ties sharing their average rank
pub fn average_ranks(xs: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..xs.len()).collect();
    order.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));

    let mut ranks = vec![0.0; xs.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && xs[order[j + 1]] == xs[order[i]] {
            j += 1;
        }
        // positions i..=j share ranks i+1..=j+1
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }
    ranks
}

pub fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    pearson(&average_ranks(xs), &average_ranks(ys))
}

/// Ordinary least squares of `ys` on `xs` with a two-sided t-test on the
/// slope (n - 2 degrees of freedom)
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Result<RegressionFit, LensError> {
    let n = xs.len();
    if n != ys.len() {
        return Err(LensError::InsufficientData(
            "regression inputs differ in length".to_string(),
        ));
    }
    if n < 3 {
        return Err(LensError::InsufficientData(format!(
            "regression needs at least 3 points, got {}",
            n
        )));
    }

    let nf = n as f64;
    let mx = xs.iter().sum::<f64>() / nf;
    let my = ys.iter().sum::<f64>() / nf;
    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        ssxm += (x - mx) * (x - mx);
        ssym += (y - my) * (y - my);
        ssxym += (x - mx) * (y - my);
    }
    ssxm /= nf;
    ssym /= nf;
    ssxym /= nf;

    if ssxm == 0.0 {
        return Err(LensError::DegenerateStatistic(
            "regressor has zero variance".to_string(),
        ));
    }

    let r = if ssym == 0.0 {
        0.0
    } else {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };
    let slope = ssxym / ssxm;
    let intercept = my - slope * mx;

    let df = nf - 2.0;
    let t = r * (df / ((1.0 - r + TINY) * (1.0 + r + TINY))).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| LensError::DegenerateStatistic(e.to_string()))?;
    let p_value = (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0);
    let std_err = ((1.0 - r * r).max(0.0) * ssym / ssxm / df).sqrt();

    Ok(RegressionFit {
        slope,
        intercept,
        r_value: r,
        r_squared: r * r,
        p_value,
        std_err,
    })
}

/// Shapiro-Wilk W statistic and p-value (Royston's approximation).
///
/// Valid for 3 to 5000 values.
pub fn shapiro_wilk(xs: &[f64]) -> Result<(f64, f64), LensError> {
    let n = xs.len();
    if n < 3 {
        return Err(LensError::InsufficientData(format!(
            "normality test needs at least 3 values, got {}",
            n
        )));
    }
    if n > 5000 {
        return Err(LensError::InsufficientData(format!(
            "normality test supports at most 5000 values, got {}",
            n
        )));
    }

    let mut x = xs.to_vec();
    x.sort_by(f64::total_cmp);
    if x[n - 1] - x[0] < 1.0e-19 {
        return Err(LensError::DegenerateStatistic(
            "all values are identical".to_string(),
        ));
    }

    let normal =
        Normal::new(0.0, 1.0).map_err(|e| LensError::DegenerateStatistic(e.to_string()))?;
    let coefficients = shapiro_coefficients(n, &normal);

    let nf = n as f64;
    let m = x.iter().sum::<f64>() / nf;
    let ssq: f64 = x.iter().map(|v| (v - m).powi(2)).sum();
    let numerator: f64 = coefficients
        .iter()
        .enumerate()
        .map(|(i, a)| a * (x[n - 1 - i] - x[i]))
        .sum();
    let w = (numerator * numerator / ssq).min(1.0);

    if n == 3 {
        let six_over_pi = 6.0 / std::f64::consts::PI;
        let asin_sqrt_three_quarters = std::f64::consts::PI / 3.0;
        let p = (six_over_pi * (w.sqrt().asin() - asin_sqrt_three_quarters)).max(0.0);
        return Ok((w, p));
    }

    let mut w1 = (1.0 - w).ln();
    let (mu, sigma) = if n <= 11 {
        let gamma = poly(&[-2.273, 0.459], nf);
        if w1 >= gamma {
            return Ok((w, 1.0e-99));
        }
        w1 = -(gamma - w1).ln();
        (
            poly(&[0.544, -0.39978, 0.025054, -6.714e-4], nf),
            poly(&[1.3822, -0.77857, 0.062767, -0.0020322], nf).exp(),
        )
    } else {
        let ln_n = nf.ln();
        (
            poly(&[-1.5861, -0.31082, -0.083751, 0.0038915], ln_n),
            poly(&[-0.4803, -0.082676, 0.0030302], ln_n).exp(),
        )
    };

    let p = normal.sf((w1 - mu) / sigma);
    Ok((w, p))
}

/// Antisymmetric weights for the n/2 outer pairs of the ordered sample
fn shapiro_coefficients(n: usize, normal: &Normal) -> Vec<f64> {
    let half = n / 2;
    if n == 3 {
        return vec![std::f64::consts::FRAC_1_SQRT_2];
    }

    let nf = n as f64;
    let m: Vec<f64> = (1..=half)
        .map(|i| normal.inverse_cdf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / nf.sqrt();

    let mut a = vec![0.0; half];
    let a1 = poly(&[0.0, 0.221157, -0.147981, -2.07119, 4.434685, -2.706056], rsn) - m[0] / ssumm2;
    a[0] = a1;

    let (first_plain, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2
            + poly(&[0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633], rsn);
        a[1] = a2;
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };

    for (ai, mi) in a.iter_mut().zip(&m).skip(first_plain) {
        *ai = -mi / fac;
    }
    a
}

fn poly(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Mean, median, sample std, min and max; `None` for an empty slice
pub fn describe(xs: &[f64]) -> Option<DescriptiveStats> {
    Some(DescriptiveStats {
        mean: mean(xs)?,
        median: median(xs)?,
        std: sample_std(xs).unwrap_or(0.0),
        min: min(xs)?,
        max: max(xs)?,
    })
}
