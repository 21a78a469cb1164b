//! Conditional and joint analysis of summary statistics.
//!
//! Given marginal effect estimates, allele frequencies, the GWAS sample
//! size and LD from a reference panel, the joint effects of a set of
//! variants and the effect of any other variant conditional on that set
//! can be approximated without individual-level data (Yang et al. 2012,
//! Nat Genet 44:369). Stepwise selection on top of this yields the
//! independent association signals of a region.
//!
//! Callers depend on the [`ConditionalSelector`] port; [`CojoEngine`] is
//! the in-process implementation backed by an LD provider.

pub mod engine;
pub mod model;
pub mod slct;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use efm_geno::{SnpId, Variant};

use crate::config::ConfigError;

pub use engine::CojoEngine;

/// Parameters of conditional selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CojoParams {
    /// GWAS sample size; required.
    pub sample_size: Option<f64>,
    /// Significance threshold for entering and staying in the model.
    pub p_threshold: f64,
    /// Variants further apart than this are assumed uncorrelated.
    pub ld_window_kb: u64,
    /// Candidates with multiple R² to the selected set at or above this
    /// are collinear and skipped.
    pub collinear: f64,
    /// Maximum allowed |EAF - reference EAF|.
    pub diff_freq: f64,
    /// Use the reference panel allele frequency instead of the EAF column.
    pub use_ref_eaf: bool,
    /// Forward steps allowed before giving up.
    pub max_iter: usize,
}

impl Default for CojoParams {
    fn default() -> Self {
        CojoParams {
            sample_size: None,
            p_threshold: 5e-8,
            ld_window_kb: 10_000,
            collinear: 0.9,
            diff_freq: 0.2,
            use_ref_eaf: false,
            max_iter: 10_000,
        }
    }
}

impl CojoParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sample_size {
            None => return Err(ConfigError::MissingSampleSize("conditional selection")),
            Some(n) if !(n > 1.0) => {
                return Err(ConfigError::invalid("sample_size", format!("must be > 1, got {n}")))
            }
            _ => {}
        }
        if !(self.p_threshold > 0.0 && self.p_threshold <= 1.0) {
            return Err(ConfigError::invalid("cojo p threshold", "must be in (0, 1]"));
        }
        if !(self.collinear > 0.0 && self.collinear < 1.0) {
            return Err(ConfigError::invalid("cojo_collinear", "must be in (0, 1)"));
        }
        if !(self.diff_freq >= 0.0) {
            return Err(ConfigError::invalid("diff_freq", "must be >= 0"));
        }
        if self.max_iter == 0 {
            return Err(ConfigError::invalid("max_iter", "must be > 0"));
        }
        Ok(())
    }
}

/// Why a window or locus fell back to marginal statistics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackReason {
    #[error("no variant overlaps the LD reference")]
    NoOverlap,

    #[error("too few usable variants")]
    TooFewVariants,

    #[error("singular LD among selected variants")]
    Singular,

    #[error("stepwise selection did not converge")]
    NotConverged,

    #[error("non-positive residual variance")]
    Degenerate,

    #[error("no variant reaches the selection threshold")]
    NoSignal,

    #[error("LD reference unavailable: {0}")]
    Reference(String),
}

/// Result of a recoverable selection step. Fatal problems are `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome<T> {
    Selected(T),
    Fallback(FallbackReason),
}

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("conditional selection failed: {0}")]
    Failed(String),
}

/// A selected independent signal with its joint estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSignal {
    pub snpid: SnpId,
    pub beta: f64,
    pub se: f64,
    pub p: f64,
}

/// Effect of a variant conditional on a fixed set.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalStats {
    pub snpid: SnpId,
    pub beta: f64,
    pub se: f64,
    pub p: f64,
}

/// Port for iterative conditional selection.
pub trait ConditionalSelector: Send + Sync {
    /// Select the independent signals among `variants` (all on `chrom`),
    /// ordered by entry into the model.
    fn select(
        &self,
        chrom: u32,
        variants: &[&Variant],
    ) -> Result<SelectionOutcome<Vec<JointSignal>>, SelectionError>;

    /// Effects of `variants` conditional on the `fixed` variants. Targets
    /// that cannot be estimated are left out of the result.
    fn condition(
        &self,
        chrom: u32,
        variants: &[&Variant],
        fixed: &[&Variant],
    ) -> Result<SelectionOutcome<Vec<ConditionalStats>>, SelectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert_eq!(
            CojoParams::default().validate(),
            Err(ConfigError::MissingSampleSize("conditional selection"))
        );
        let ok = CojoParams {
            sample_size: Some(10_000.0),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
        let bad = CojoParams {
            collinear: 1.0,
            ..ok
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter { .. })
        ));
    }
}
