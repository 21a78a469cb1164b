//! efm-geno: Summary statistics and reference panel I/O for easyfinemap-rs
//!
//! Provides the standardized [`Variant`] record, the summary-statistics
//! table reader/writer, LD-block and chromosome-size tables, and a
//! memory-mapped PLINK bed/bim/fam reader for LD reference panels.

pub mod format;
pub mod plink;
pub mod regions;
pub mod sumstats;
pub mod variant;

pub use plink::{AlleleStats, PlinkReader};
pub use regions::{ChromSizes, LdBlock, LdBlocks};
pub use variant::{SnpId, Variant, VariantError};
