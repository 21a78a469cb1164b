//! Configuration errors shared by the locus and fine-mapping engines.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} requires an LD reference panel")]
    MissingLdReference(&'static str),

    #[error("{0} requires the GWAS sample size")]
    MissingSampleSize(&'static str),

    #[error("EAF is missing for {n_missing} variants; provide EAF or enable the reference EAF option")]
    MissingEaf { n_missing: usize },

    #[error("several methods requested ({0}) with a credible threshold; choose the credible-set method")]
    AmbiguousCredibleMethod(String),

    #[error("credible-set method {0} was not requested")]
    CredibleMethodNotRequested(String),

    #[error("no scorer registered for method {0}")]
    NoScorer(String),

    #[error("ABF supports a single causal variant, got max_causal = {0}")]
    AbfMaxCausal(usize),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
