//! In-process conditional selection backed by an LD provider.

use std::sync::Arc;

use efm_geno::Variant;
use tracing::warn;

use crate::config::ConfigError;
use crate::ld::{LdError, LdProvider};

use super::model::{FitError, SummaryModel};
use super::slct::stepwise_select;
use super::{
    CojoParams, ConditionalSelector, ConditionalStats, FallbackReason, JointSignal,
    SelectionError, SelectionOutcome,
};

pub struct CojoEngine {
    ld: Arc<dyn LdProvider>,
    params: CojoParams,
}

impl CojoEngine {
    pub fn new(ld: Arc<dyn LdProvider>, params: CojoParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(CojoEngine { ld, params })
    }

    pub fn params(&self) -> &CojoParams {
        &self.params
    }

    fn check_eaf(&self, variants: &[&Variant]) -> Result<(), ConfigError> {
        if self.params.use_ref_eaf {
            return Ok(());
        }
        let n_missing = variants.iter().filter(|v| v.eaf.is_none()).count();
        if n_missing > 0 {
            return Err(ConfigError::MissingEaf { n_missing });
        }
        Ok(())
    }

    /// Build the region model, or the reason it cannot be built.
    fn model(&self, chrom: u32, variants: &[&Variant]) -> Result<SummaryModel, FallbackReason> {
        let slice = self.ld.ld_slice(chrom, variants).map_err(|e| match e {
            LdError::NoOverlap { .. } => FallbackReason::NoOverlap,
            other => FallbackReason::Reference(other.to_string()),
        })?;
        SummaryModel::build(variants, slice, &self.params).ok_or(FallbackReason::TooFewVariants)
    }
}

impl ConditionalSelector for CojoEngine {
    fn select(
        &self,
        chrom: u32,
        variants: &[&Variant],
    ) -> Result<SelectionOutcome<Vec<JointSignal>>, SelectionError> {
        self.check_eaf(variants)?;
        let outcome = self
            .model(chrom, variants)
            .and_then(|model| stepwise_select(&model, &self.params));
        Ok(match outcome {
            Ok(signals) => SelectionOutcome::Selected(signals),
            Err(reason) => SelectionOutcome::Fallback(reason),
        })
    }

    fn condition(
        &self,
        chrom: u32,
        variants: &[&Variant],
        fixed: &[&Variant],
    ) -> Result<SelectionOutcome<Vec<ConditionalStats>>, SelectionError> {
        self.check_eaf(variants)?;
        self.check_eaf(fixed)?;

        let mut all: Vec<&Variant> = variants.to_vec();
        for &f in fixed {
            if !all.iter().any(|v| v.snpid == f.snpid) {
                all.push(f);
            }
        }
        let model = match self.model(chrom, &all) {
            Ok(m) => m,
            Err(reason) => return Ok(SelectionOutcome::Fallback(reason)),
        };

        let fixed_idx: Vec<usize> = fixed
            .iter()
            .filter_map(|f| model.index_of(&f.snpid))
            .collect();
        if fixed_idx.len() < fixed.len() {
            warn!(
                "chr{}: {} of {} conditioning variants are not usable in the LD reference",
                chrom,
                fixed.len() - fixed_idx.len(),
                fixed.len()
            );
        }
        let fit = match model.joint(&fixed_idx) {
            Ok(fit) => fit,
            Err(FitError::Singular(_)) => {
                return Ok(SelectionOutcome::Fallback(FallbackReason::Singular))
            }
            Err(FitError::Degenerate) => {
                return Ok(SelectionOutcome::Fallback(FallbackReason::Degenerate))
            }
        };

        let mut stats = Vec::with_capacity(variants.len());
        for v in variants {
            let Some(c) = model.index_of(&v.snpid) else {
                continue;
            };
            let estimate = if let Some(k) = fit.members.iter().position(|&m| m == c) {
                // A conditioning variant keeps its joint estimate.
                Some((fit.beta[k], fit.se[k], fit.p[k]))
            } else {
                model
                    .conditional(c, &fit)
                    .filter(|cf| cf.beta.is_finite())
                    .map(|cf| (cf.beta, cf.se, cf.p))
            };
            if let Some((beta, se, p)) = estimate {
                stats.push(ConditionalStats {
                    snpid: v.snpid.clone(),
                    beta,
                    se,
                    p,
                });
            }
        }
        Ok(SelectionOutcome::Selected(stats))
    }
}
