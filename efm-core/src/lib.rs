//! efm-core: locus identification and fine-mapping for easyfinemap-rs
//!
//! Partitions GWAS summary statistics into independent loci (distance,
//! LD clumping or conditional selection), computes per-locus posterior
//! probabilities of causality (ABF or registered external scorers) and
//! derives credible sets.

pub mod cojo;
pub mod config;
pub mod finemap;
pub mod ld;
pub mod loci;
pub mod model;
pub mod util;

pub use config::ConfigError;
pub use model::Locus;
