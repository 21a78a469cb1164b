//! LD reference port.
//!
//! Strategies that need correlation between variants ask an
//! [`LdProvider`] for an [`LdSlice`] covering a set of summary-statistics
//! variants. Correlations in a slice are signed relative to each
//! variant's effect allele.

use std::collections::{HashMap, HashSet};

use efm_geno::{SnpId, Variant};
use efm_linalg::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LdError {
    #[error("no LD reference panel for chromosome {0}")]
    MissingChromosome(u32),

    #[error("none of the {n_requested} variants on chromosome {chrom} are in the LD reference")]
    NoOverlap { chrom: u32, n_requested: usize },

    #[error("LD reference error: {0}")]
    Reference(String),
}

/// Correlations among the requested variants present in the reference.
#[derive(Debug, Clone)]
pub struct LdSlice {
    ids: Vec<SnpId>,
    index: HashMap<SnpId, usize>,
    r: DenseMatrix,
    ref_eaf: Vec<f64>,
}

impl LdSlice {
    /// `r` is signed by effect allele; `ref_eaf` is the panel frequency of
    /// each variant's effect allele.
    pub fn new(ids: Vec<SnpId>, r: DenseMatrix, ref_eaf: Vec<f64>) -> Self {
        debug_assert_eq!(ids.len(), r.nrows());
        debug_assert_eq!(ids.len(), ref_eaf.len());
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        LdSlice {
            ids,
            index,
            r,
            ref_eaf,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[SnpId] {
        &self.ids
    }

    pub fn position(&self, id: &SnpId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &SnpId) -> bool {
        self.index.contains_key(id)
    }

    /// Signed r by slice position.
    pub fn r_at(&self, i: usize, j: usize) -> f64 {
        self.r.get(i, j)
    }

    /// Signed r between two variants, `None` when either is absent.
    pub fn r(&self, a: &SnpId, b: &SnpId) -> Option<f64> {
        Some(self.r.get(self.position(a)?, self.position(b)?))
    }

    /// r² between two variants; 0 when either is absent.
    pub fn r2(&self, a: &SnpId, b: &SnpId) -> f64 {
        self.r(a, b).map(|r| r * r).unwrap_or(0.0)
    }

    pub fn ref_eaf(&self, id: &SnpId) -> Option<f64> {
        self.position(id).map(|i| self.ref_eaf[i])
    }
}

/// Source of LD correlations for summary-statistics variants.
pub trait LdProvider: Send + Sync {
    /// LD among the `variants` (all on `chrom`) that the reference holds.
    ///
    /// Variants missing from the reference are left out of the slice.
    /// An empty intersection is [`LdError::NoOverlap`].
    fn ld_slice(&self, chrom: u32, variants: &[&Variant]) -> Result<LdSlice, LdError>;
}

/// In-memory LD provider with explicitly listed correlations.
///
/// Unlisted pairs have r = 0, every listed or requested variant is
/// present unless marked absent, and the reference EAF defaults to the
/// variant's own EAF (or 0.5).
#[derive(Debug, Clone, Default)]
pub struct StaticLd {
    pairs: HashMap<(SnpId, SnpId), f64>,
    eaf: HashMap<SnpId, f64>,
    absent: HashSet<SnpId>,
    failing: HashSet<u32>,
}

impl StaticLd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set signed r between `a` and `b`.
    pub fn with_r(mut self, a: &SnpId, b: &SnpId, r: f64) -> Self {
        self.pairs.insert(Self::key(a, b), r);
        self
    }

    pub fn with_eaf(mut self, id: &SnpId, eaf: f64) -> Self {
        self.eaf.insert(id.clone(), eaf);
        self
    }

    /// Mark a variant as missing from the reference.
    pub fn without(mut self, id: &SnpId) -> Self {
        self.absent.insert(id.clone());
        self
    }

    /// Make every request for `chrom` fail.
    pub fn failing_chrom(mut self, chrom: u32) -> Self {
        self.failing.insert(chrom);
        self
    }

    fn key(a: &SnpId, b: &SnpId) -> (SnpId, SnpId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }
}

impl LdProvider for StaticLd {
    fn ld_slice(&self, chrom: u32, variants: &[&Variant]) -> Result<LdSlice, LdError> {
        if self.failing.contains(&chrom) {
            return Err(LdError::Reference(format!(
                "chromosome {chrom} marked as failing"
            )));
        }
        let present: Vec<&Variant> = variants
            .iter()
            .copied()
            .filter(|v| !self.absent.contains(&v.snpid))
            .collect();
        if present.is_empty() {
            return Err(LdError::NoOverlap {
                chrom,
                n_requested: variants.len(),
            });
        }
        let n = present.len();
        let r = DenseMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                self.pairs
                    .get(&Self::key(&present[i].snpid, &present[j].snpid))
                    .copied()
                    .unwrap_or(0.0)
            }
        });
        let ref_eaf = present
            .iter()
            .map(|v| {
                self.eaf
                    .get(&v.snpid)
                    .copied()
                    .or(v.eaf)
                    .unwrap_or(0.5)
            })
            .collect();
        let ids = present.iter().map(|v| v.snpid.clone()).collect();
        Ok(LdSlice::new(ids, r, ref_eaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(bp: u64) -> Variant {
        Variant::new(1, bp, None, "A", "G", Some(0.3), None, 0.1, 0.02, 1e-9).unwrap()
    }

    #[test]
    fn test_static_ld_slice() {
        let a = var(100);
        let b = var(200);
        let c = var(300);
        let ld = StaticLd::new()
            .with_r(&b.snpid, &a.snpid, 0.8)
            .with_eaf(&c.snpid, 0.9)
            .without(&c.snpid);
        let slice = ld.ld_slice(1, &[&a, &b, &c]).unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.r(&a.snpid, &b.snpid), Some(0.8));
        assert!((slice.r2(&a.snpid, &b.snpid) - 0.64).abs() < 1e-12);
        assert_eq!(slice.r2(&a.snpid, &c.snpid), 0.0);
        assert_eq!(slice.ref_eaf(&a.snpid), Some(0.3));
        assert!(!slice.contains(&c.snpid));
    }

    #[test]
    fn test_static_ld_errors() {
        let a = var(100);
        let ld = StaticLd::new().without(&a.snpid).failing_chrom(2);
        assert_eq!(
            ld.ld_slice(1, &[&a]).unwrap_err(),
            LdError::NoOverlap {
                chrom: 1,
                n_requested: 1
            }
        );
        assert!(matches!(ld.ld_slice(2, &[&a]), Err(LdError::Reference(_))));
    }
}
