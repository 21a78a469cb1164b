//! Locus identification.
//!
//! Significant variants are partitioned into loci by one of three
//! strategies built on the [`merger`]: fixed distance (or LD blocks), LD
//! clumping, or conditional selection. The resulting clusters are turned
//! into loci by [`postprocess`].

pub mod clumping;
pub mod conditional;
pub mod distance;
pub mod merger;
pub mod output;
pub mod postprocess;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use efm_geno::variant::significance_order;
use efm_geno::{ChromSizes, LdBlocks, Variant};

use crate::cojo::{CojoEngine, CojoParams, ConditionalSelector, JointSignal, SelectionError};
use crate::config::ConfigError;
use crate::ld::LdProvider;
use crate::model::Locus;

/// Locus identification method and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum StrategyParams {
    Distance {
        distance_kb: u64,
    },
    Clumping {
        clump_kb: u64,
        clump_r2: f64,
    },
    Conditional {
        window_kb: u64,
        cojo: CojoParams,
    },
}

impl StrategyParams {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyParams::Distance { .. } => "distance",
            StrategyParams::Clumping { .. } => "clumping",
            StrategyParams::Conditional { .. } => "conditional",
        }
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams::Distance { distance_kb: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LociConfig {
    pub sig_threshold: f64,
    pub loci_extension_kb: u64,
    pub merge_loci: bool,
    /// Conditional strategy: hand only significant variants to selection.
    pub only_use_sig_snps: bool,
    pub strategy: StrategyParams,
}

impl Default for LociConfig {
    fn default() -> Self {
        LociConfig {
            sig_threshold: 5e-8,
            loci_extension_kb: 500,
            merge_loci: false,
            only_use_sig_snps: false,
            strategy: StrategyParams::default(),
        }
    }
}

impl LociConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sig_threshold > 0.0 && self.sig_threshold <= 1.0) {
            return Err(ConfigError::invalid("sig_threshold", "must be in (0, 1]"));
        }
        if let StrategyParams::Clumping { clump_r2, .. } = self.strategy {
            if !(0.0..=1.0).contains(&clump_r2) {
                return Err(ConfigError::invalid("clump_r2", "must be in [0, 1]"));
            }
        }
        if let StrategyParams::Conditional { cojo, .. } = &self.strategy {
            cojo.validate()?;
        }
        Ok(())
    }
}

/// External inputs of locus identification.
#[derive(Clone, Default)]
pub struct LociContext {
    pub ld: Option<Arc<dyn LdProvider>>,
    pub ld_blocks: Option<LdBlocks>,
    pub chrom_sizes: Option<ChromSizes>,
    /// Overrides the in-process selector built from `ld`.
    pub selector: Option<Arc<dyn ConditionalSelector>>,
}

/// A lead variant, with joint estimates when chosen by conditional selection.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadSnp {
    pub variant: Variant,
    pub joint: Option<JointSignal>,
}

/// A lead and the variants it claimed.
#[derive(Debug, Clone)]
pub struct LocusCluster {
    pub lead: LeadSnp,
    pub claimed: Vec<Variant>,
}

impl LocusCluster {
    pub(crate) fn from_merge(cluster: &merger::Cluster<'_>, joint: Option<JointSignal>) -> Self {
        LocusCluster {
            lead: LeadSnp {
                variant: cluster.lead.clone(),
                joint,
            },
            claimed: cluster.claimed.iter().map(|&v| v.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LociResult {
    /// Final loci sorted by (CHR, START, END).
    pub loci: Vec<Locus>,
    /// Lead SNPs, one-to-one with `loci`.
    pub lead_snps: Vec<LeadSnp>,
    /// Set when loci on a chromosome overlap (merging disabled).
    pub overlapping: bool,
    /// Strategy clusters before locus post-processing.
    pub clusters: Vec<LocusCluster>,
}

#[derive(Error, Debug)]
pub enum LociError {
    #[error("no variants in input")]
    EmptyInput,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Identify independent loci among `variants`.
pub fn identify_loci(
    variants: &[Variant],
    config: &LociConfig,
    ctx: &LociContext,
) -> Result<LociResult, LociError> {
    if variants.is_empty() {
        return Err(LociError::EmptyInput);
    }
    config.validate()?;

    let pool: Vec<&Variant> = variants
        .iter()
        .filter(|v| v.p <= config.sig_threshold)
        .collect();
    info!(
        "{} of {} variants reach P <= {:e}",
        pool.len(),
        variants.len(),
        config.sig_threshold
    );

    let mut clusters = if pool.is_empty() {
        Vec::new()
    } else {
        match &config.strategy {
            StrategyParams::Distance { distance_kb } => {
                distance::distance_clusters(&pool, *distance_kb, ctx.ld_blocks.as_ref())
            }
            StrategyParams::Clumping { clump_kb, clump_r2 } => {
                let ld = ctx
                    .ld
                    .as_deref()
                    .ok_or(ConfigError::MissingLdReference("clumping"))?;
                clumping::clump_clusters(&pool, *clump_kb, *clump_r2, ld)
            }
            StrategyParams::Conditional { window_kb, cojo } => {
                let selector: Arc<dyn ConditionalSelector> = match &ctx.selector {
                    Some(s) => Arc::clone(s),
                    None => {
                        let ld = ctx
                            .ld
                            .clone()
                            .ok_or(ConfigError::MissingLdReference("conditional"))?;
                        Arc::new(CojoEngine::new(ld, cojo.clone())?)
                    }
                };
                if config.merge_loci {
                    warn!("Merging overlapping loci may combine independent conditional signals");
                }
                conditional::conditional_clusters(
                    variants,
                    &pool,
                    *window_kb,
                    config.only_use_sig_snps,
                    ctx.ld_blocks.as_ref(),
                    selector.as_ref(),
                )?
            }
        }
    };

    if clusters.is_empty() {
        // Never report zero loci for a non-empty input.
        let top = variants
            .iter()
            .min_by(|a, b| significance_order(a, b))
            .ok_or(LociError::EmptyInput)?;
        warn!(
            "No locus found at P <= {:e}; using the most significant variant {} (P = {:e}) as the only lead",
            config.sig_threshold, top.snpid, top.p
        );
        clusters.push(LocusCluster {
            lead: LeadSnp {
                variant: top.clone(),
                joint: None,
            },
            claimed: Vec::new(),
        });
    }

    info!(
        "{} lead SNPs identified with the {} method",
        clusters.len(),
        config.strategy.name()
    );
    Ok(postprocess::build_loci(clusters, config, ctx))
}
