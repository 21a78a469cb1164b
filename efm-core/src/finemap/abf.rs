//! Approximate Bayes factors (Wakefield 2009) under a single causal
//! variant.

use thiserror::Error;

use efm_geno::SnpId;

use crate::util::math::log_sum_exp_slice;

use super::scorer::Effect;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AbfError {
    #[error("{snpid}: SE must be > 0, got {se}")]
    InvalidSe { snpid: SnpId, se: f64 },

    #[error("{snpid}: BETA and SE must be finite")]
    NonFinite { snpid: SnpId },

    #[error("prior W must be a positive number, got {0}")]
    InvalidPrior(f64),
}

/// log ABF = 0.5 ln(V / (V + W²)) + 0.5 r z², with V = SE², r = W² / (V + W²).
pub fn log_abf(beta: f64, se: f64, w: f64) -> f64 {
    let v = se * se;
    let w2 = w * w;
    let r = w2 / (v + w2);
    let z2 = beta * beta / v;
    0.5 * (v / (v + w2)).ln() + 0.5 * r * z2
}

/// Posterior probabilities `ABF_i / Σ ABF`, normalized in log space.
pub fn run_abf(effects: &[Effect], w: f64) -> Result<Vec<f64>, AbfError> {
    if !(w > 0.0 && w.is_finite()) {
        return Err(AbfError::InvalidPrior(w));
    }
    let mut log_bf = Vec::with_capacity(effects.len());
    for e in effects {
        if !e.beta.is_finite() || !e.se.is_finite() {
            return Err(AbfError::NonFinite {
                snpid: e.snpid.clone(),
            });
        }
        if e.se <= 0.0 {
            return Err(AbfError::InvalidSe {
                snpid: e.snpid.clone(),
                se: e.se,
            });
        }
        log_bf.push(log_abf(e.beta, e.se, w));
    }
    let total = log_sum_exp_slice(&log_bf);
    Ok(log_bf.into_iter().map(|x| (x - total).exp()).collect())
}
