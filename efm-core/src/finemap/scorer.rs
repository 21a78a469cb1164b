//! Port for fine-mapping methods implemented outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use efm_geno::{SnpId, Variant};

use crate::ld::LdSlice;
use crate::model::Locus;

use super::Method;

/// Effect estimate scored for one variant: marginal, or conditional on
/// nearby leads.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub snpid: SnpId,
    pub beta: f64,
    pub se: f64,
}

impl Effect {
    pub fn marginal(v: &Variant) -> Self {
        Effect {
            snpid: v.snpid.clone(),
            beta: v.beta,
            se: v.se,
        }
    }
}

/// Everything a scorer sees of one locus. `effects` is aligned with
/// `variants`.
pub struct LocusInput<'a> {
    pub locus: &'a Locus,
    pub variants: &'a [&'a Variant],
    pub effects: &'a [Effect],
    pub ld: Option<&'a LdSlice>,
    pub sample_size: Option<f64>,
    pub max_causal: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScorerError {
    #[error("{method} requires an LD slice")]
    MissingLd { method: Method },

    #[error("{method} returned {got} probabilities for {expected} variants")]
    Length {
        method: Method,
        expected: usize,
        got: usize,
    },

    #[error("{method} failed: {reason}")]
    Failed { method: Method, reason: String },
}

/// A fine-mapping method producing one posterior probability per input
/// variant, in input order.
pub trait ExternalScorer: Send + Sync {
    fn method(&self) -> Method;

    fn score(&self, input: &LocusInput<'_>) -> Result<Vec<f64>, ScorerError>;
}

#[derive(Clone, Default)]
pub struct ScorerRegistry {
    scorers: HashMap<Method, Arc<dyn ExternalScorer>>,
}

impl ScorerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scorer under its method, replacing any previous one.
    pub fn register(&mut self, scorer: Arc<dyn ExternalScorer>) {
        self.scorers.insert(scorer.method(), scorer);
    }

    pub fn get(&self, method: Method) -> Option<&Arc<dyn ExternalScorer>> {
        self.scorers.get(&method)
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }
}
