//! Fine-mapping: per-locus posterior probabilities of causality and
//! credible sets.
//!
//! ABF is computed in-process; every other method is scored through a
//! registered [`scorer::ExternalScorer`]. One method drives credible-set
//! membership, the other columns are kept for inspection.

pub mod abf;
pub mod credible;
pub mod pipeline;
pub mod scorer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub use abf::{run_abf, AbfError};
pub use credible::{credible_set, Posterior};
pub use pipeline::{finemap_all_loci, write_finemap, FinemapContext, FinemapError, FinemapReport, ScoredVariant};
pub use scorer::{Effect, ExternalScorer, LocusInput, ScorerError, ScorerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Abf,
    Finemap,
    Paintor,
    Caviarbf,
    Susie,
    PolyfunFinemap,
    PolyfunSusie,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Abf,
        Method::Finemap,
        Method::Paintor,
        Method::Caviarbf,
        Method::Susie,
        Method::PolyfunFinemap,
        Method::PolyfunSusie,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Abf => "abf",
            Method::Finemap => "finemap",
            Method::Paintor => "paintor",
            Method::Caviarbf => "caviarbf",
            Method::Susie => "susie",
            Method::PolyfunFinemap => "polyfun_finemap",
            Method::PolyfunSusie => "polyfun_susie",
        }
    }

    /// Output column holding this method's posterior probabilities.
    pub fn column(&self) -> String {
        format!("PP_{}", self.name().to_uppercase())
    }

    pub fn requires_ld(&self) -> bool {
        !matches!(self, Method::Abf)
    }

    /// Parse a comma-separated list; `all` expands to every method.
    /// Duplicates are dropped, first occurrence wins.
    pub fn parse_list(s: &str) -> Result<Vec<Method>, ConfigError> {
        let mut out = Vec::new();
        for item in s.split(',').map(str::trim).filter(|x| !x.is_empty()) {
            let expanded: Vec<Method> = if item.eq_ignore_ascii_case("all") {
                Method::ALL.to_vec()
            } else {
                vec![item.parse()?]
            };
            for m in expanded {
                if !out.contains(&m) {
                    out.push(m);
                }
            }
        }
        if out.is_empty() {
            return Err(ConfigError::invalid("methods", "no fine-mapping method given"));
        }
        Ok(out)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Method::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| ConfigError::invalid("method", format!("unknown fine-mapping method '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinemapConfig {
    pub methods: Vec<Method>,
    /// Prior standard deviation of the effect size for ABF.
    pub prior_w: f64,
    pub credible_threshold: Option<f64>,
    pub credible_method: Option<Method>,
    pub max_causal: usize,
    pub sample_size: Option<f64>,
    pub use_ref_eaf: bool,
    /// Score effects conditional on the other lead SNPs nearby.
    pub conditional: bool,
    pub cond_snps_wind_kb: u64,
    /// Loci with more variants keep only the most significant ones.
    pub max_variants: usize,
}

impl Default for FinemapConfig {
    fn default() -> Self {
        FinemapConfig {
            methods: vec![Method::Abf],
            prior_w: 0.2,
            credible_threshold: None,
            credible_method: None,
            max_causal: 1,
            sample_size: None,
            use_ref_eaf: false,
            conditional: false,
            cond_snps_wind_kb: 1000,
            max_variants: 5000,
        }
    }
}

impl FinemapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.methods.is_empty() {
            return Err(ConfigError::invalid("methods", "no fine-mapping method given"));
        }
        if !(self.prior_w > 0.0 && self.prior_w.is_finite()) {
            return Err(ConfigError::invalid("prior_w", "must be a positive number"));
        }
        if let Some(t) = self.credible_threshold {
            if !(t > 0.0 && t.is_finite()) {
                return Err(ConfigError::invalid("credible_threshold", "must be in (0, 1]"));
            }
        }
        if self.max_causal == 0 {
            return Err(ConfigError::invalid("max_causal", "must be >= 1"));
        }
        if self.max_causal > 1 && self.methods.contains(&Method::Abf) {
            return Err(ConfigError::AbfMaxCausal(self.max_causal));
        }
        if self.max_variants == 0 {
            return Err(ConfigError::invalid("max_variants", "must be >= 1"));
        }
        if let Some(n) = self.sample_size {
            if !(n > 1.0) {
                return Err(ConfigError::invalid("sample_size", format!("must be > 1, got {n}")));
            }
        }
        if self.conditional && self.sample_size.is_none() {
            return Err(ConfigError::MissingSampleSize("conditional fine-mapping"));
        }
        self.credible_selector()?;
        Ok(())
    }

    /// The method whose probabilities drive credible-set membership.
    pub fn credible_selector(&self) -> Result<Option<Method>, ConfigError> {
        if let Some(m) = self.credible_method {
            if !self.methods.contains(&m) {
                return Err(ConfigError::CredibleMethodNotRequested(m.to_string()));
            }
            return Ok(Some(m));
        }
        match (self.credible_threshold, self.methods.as_slice()) {
            (None, _) => Ok(None),
            (Some(_), [only]) => Ok(Some(*only)),
            (Some(_), many) => Err(ConfigError::AmbiguousCredibleMethod(
                many.iter().map(Method::name).collect::<Vec<_>>().join(","),
            )),
        }
    }
}
