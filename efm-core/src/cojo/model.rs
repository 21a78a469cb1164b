#![allow(clippy::needless_range_loop)]
//! Joint and conditional effect estimates from summary statistics.
//!
//! With H_j = 2 p_j (1 - p_j) and D_j = H_j N, the normal equations of
//! the multi-variant regression are approximated by
//! B_jk = sqrt(D_j D_k) r_jk (B_jj = D_j) and right-hand side D_j b_j.
//! The phenotypic variance Vp is the median over variants of
//! H_j N (SE_j² + b_j² / (N - 1)) and y'y = (N - 1) Vp.

use efm_geno::{SnpId, Variant};
use efm_linalg::decomposition::{CholeskyDecomp, LinalgError};
use efm_linalg::DenseMatrix;
use tracing::debug;

use crate::ld::LdSlice;
use crate::util::math::{chisq1_pvalue, median};

use super::CojoParams;

/// Summary-statistics model of one region.
#[derive(Debug, Clone)]
pub struct SummaryModel {
    ids: Vec<SnpId>,
    bp: Vec<u64>,
    b: Vec<f64>,
    p: Vec<f64>,
    d: Vec<f64>,
    /// Position of each model variant in the LD slice.
    ld_pos: Vec<usize>,
    ld: LdSlice,
    n: f64,
    yy: f64,
    window_bp: u64,
}

/// Joint fit of a set of model variants.
#[derive(Debug, Clone)]
pub struct JointFit {
    /// Model indices, in the order of the estimates below.
    pub members: Vec<usize>,
    pub beta: Vec<f64>,
    pub se: Vec<f64>,
    pub p: Vec<f64>,
    /// Residual variance.
    pub sigma2: f64,
    chol: CholeskyDecomp,
    /// D_j b_j for the members.
    db: Vec<f64>,
}

/// Estimate of one variant conditional on a joint fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionalFit {
    pub beta: f64,
    pub se: f64,
    pub p: f64,
    /// Multiple R² of the variant on the conditioning set.
    pub r2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    Singular(LinalgError),
    Degenerate,
}

impl From<LinalgError> for FitError {
    fn from(e: LinalgError) -> Self {
        FitError::Singular(e)
    }
}

/// Frequency used for a variant, after the reference EAF and diff_freq rules.
fn model_frequency(v: &Variant, ref_eaf: Option<f64>, params: &CojoParams) -> Option<f64> {
    let freq = match (v.eaf, ref_eaf) {
        (Some(eaf), Some(r)) if (eaf - r).abs() > params.diff_freq => return None,
        (_, Some(r)) if params.use_ref_eaf => r,
        (Some(eaf), _) => eaf,
        (None, _) => return None,
    };
    (freq > 0.0 && freq < 1.0).then_some(freq)
}

impl SummaryModel {
    /// Build the model from the variants that are in the LD slice and pass
    /// the frequency filters. Returns `None` when no variant is usable.
    pub fn build(variants: &[&Variant], ld: LdSlice, params: &CojoParams) -> Option<Self> {
        let n = params.sample_size?;

        let mut ids = Vec::new();
        let mut bp = Vec::new();
        let mut b = Vec::new();
        let mut p = Vec::new();
        let mut d = Vec::new();
        let mut ld_pos = Vec::new();
        let mut vp = Vec::new();
        let mut n_freq_filtered = 0usize;

        for v in variants {
            let Some(pos) = ld.position(&v.snpid) else {
                continue;
            };
            let Some(freq) = model_frequency(v, ld.ref_eaf(&v.snpid), params) else {
                n_freq_filtered += 1;
                continue;
            };
            let h = 2.0 * freq * (1.0 - freq);
            ids.push(v.snpid.clone());
            bp.push(v.bp);
            b.push(v.beta);
            p.push(v.p);
            d.push(h * n);
            ld_pos.push(pos);
            vp.push(h * n * (v.se * v.se + v.beta * v.beta / (n - 1.0)));
        }

        if n_freq_filtered > 0 {
            debug!(
                "{} variants removed by allele frequency filters (diff_freq = {})",
                n_freq_filtered, params.diff_freq
            );
        }
        if ids.is_empty() {
            return None;
        }

        let yy = (n - 1.0) * median(&vp);
        Some(SummaryModel {
            ids,
            bp,
            b,
            p,
            d,
            ld_pos,
            ld,
            n,
            yy,
            window_bp: params.ld_window_kb.saturating_mul(1000),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, i: usize) -> &SnpId {
        &self.ids[i]
    }

    pub fn index_of(&self, id: &SnpId) -> Option<usize> {
        self.ids.iter().position(|x| x == id)
    }

    /// Marginal P of model variant `i`.
    pub fn marginal_p(&self, i: usize) -> f64 {
        self.p[i]
    }

    pub fn marginal_beta(&self, i: usize) -> f64 {
        self.b[i]
    }

    /// Entry B_jk of the approximate X'X.
    fn b_entry(&self, j: usize, k: usize) -> f64 {
        if j == k {
            return self.d[j];
        }
        if self.bp[j].abs_diff(self.bp[k]) > self.window_bp {
            return 0.0;
        }
        (self.d[j] * self.d[k]).sqrt() * self.ld.r_at(self.ld_pos[j], self.ld_pos[k])
    }

    /// Joint estimates of the model variants in `members`.
    pub fn joint(&self, members: &[usize]) -> Result<JointFit, FitError> {
        let m = members.len();
        let b_ss = DenseMatrix::from_fn(m, m, |i, j| self.b_entry(members[i], members[j]));
        let db: Vec<f64> = members.iter().map(|&j| self.d[j] * self.b[j]).collect();

        let chol = CholeskyDecomp::new(&b_ss)?;
        let beta = chol.solve(&db)?;
        let sigma2 = (self.yy - DenseMatrix::dot(&beta, &db)) / (self.n - m as f64);
        if !(sigma2 > 0.0) {
            return Err(FitError::Degenerate);
        }

        let inv = chol.inverse();
        let se: Vec<f64> = (0..m).map(|i| (sigma2 * inv.get(i, i)).sqrt()).collect();
        let p = beta
            .iter()
            .zip(&se)
            .map(|(b, s)| chisq1_pvalue(b / s))
            .collect();

        Ok(JointFit {
            members: members.to_vec(),
            beta,
            se,
            p,
            sigma2,
            chol,
            db,
        })
    }

    /// Effect of model variant `c` conditional on the members of `fit`.
    ///
    /// `None` when the conditional variance is not positive.
    pub fn conditional(&self, c: usize, fit: &JointFit) -> Option<ConditionalFit> {
        let m = fit.members.len();
        if m == 0 {
            return Some(self.marginal(c));
        }
        let b_cs: Vec<f64> = fit.members.iter().map(|&s| self.b_entry(c, s)).collect();
        if b_cs.iter().all(|&x| x == 0.0) {
            return Some(self.marginal(c));
        }

        let d_c = self.d[c];
        let denom = d_c - fit.chol.inverse_quad_form(&b_cs).ok()?;
        let r2 = (1.0 - denom / d_c).clamp(0.0, 1.0);
        if !(denom > 0.0) {
            return Some(ConditionalFit {
                beta: f64::NAN,
                se: f64::NAN,
                p: f64::NAN,
                r2: 1.0,
            });
        }

        let rhs = d_c * self.b[c] - DenseMatrix::dot(&b_cs, &fit.beta);
        let beta = rhs / denom;
        let sigma2 =
            (self.yy - DenseMatrix::dot(&fit.beta, &fit.db) - beta * rhs) / (self.n - m as f64 - 1.0);
        if !(sigma2 > 0.0) {
            return None;
        }
        let se = (sigma2 / denom).sqrt();
        Some(ConditionalFit {
            beta,
            se,
            p: chisq1_pvalue(beta / se),
            r2,
        })
    }

    /// Single-variant estimate under the model's residual variance.
    fn marginal(&self, c: usize) -> ConditionalFit {
        let d_c = self.d[c];
        let beta = self.b[c];
        let sigma2 = (self.yy - beta * d_c * beta) / (self.n - 1.0);
        let se = (sigma2.max(f64::MIN_POSITIVE) / d_c).sqrt();
        ConditionalFit {
            beta,
            se,
            p: chisq1_pvalue(beta / se),
            r2: 0.0,
        }
    }
}
