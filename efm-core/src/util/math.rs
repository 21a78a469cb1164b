//! Mathematical utility functions.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Log-sum-exp for numerically stable addition of log-probabilities.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// log(sum(exp(x))) over a slice; `-inf` for an empty slice.
pub fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Upper tail of the 1-df chi-square distribution at `z^2`.
pub fn chisq1_pvalue(z: f64) -> f64 {
    let stat = z * z;
    if !stat.is_finite() {
        return if stat.is_nan() { f64::NAN } else { 0.0 };
    }
    match ChiSquared::new(1.0) {
        Ok(dist) => dist.sf(stat),
        Err(_) => f64::NAN,
    }
}

/// Median of the finite values; NaN when none.
pub fn median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        0.5 * (v[n / 2 - 1] + v[n / 2])
    }
}
