//! Standardized association records.
//!
//! A [`Variant`] is one row of a validated summary-statistics table. The
//! [`SnpId`] key (`CHR-BP-A1-A2` with the two alleles sorted) is what
//! joins summary statistics against reference panel variants, so it is
//! independent of which allele was reported as the effect allele.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Chromosome code used for X.
pub const CHROM_X: u32 = 23;

/// Allele-order independent variant key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnpId(String);

impl SnpId {
    pub fn new(chrom: u32, bp: u64, a1: &str, a2: &str) -> Self {
        let (lo, hi) = if a1 <= a2 { (a1, a2) } else { (a2, a1) };
        SnpId(format!("{chrom}-{bp}-{lo}-{hi}"))
    }

    /// Parse a `CHR-BP-A1-A2` key, re-sorting the alleles.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().splitn(4, '-');
        let chrom = parse_chrom(parts.next()?)?;
        let bp = parts.next()?.parse().ok()?;
        let a1 = parts.next()?;
        let a2 = parts.next()?;
        if a1.is_empty() || a2.is_empty() {
            return None;
        }
        Some(SnpId::new(chrom, bp, a1, a2))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariantError {
    #[error("empty allele")]
    EmptyAllele,

    #[error("effect and non-effect alleles are identical ({0})")]
    IdenticalAlleles(String),

    #[error("SE must be finite and > 0, got {0}")]
    InvalidSe(f64),

    #[error("BETA must be finite, got {0}")]
    InvalidBeta(f64),

    #[error("P must be in (0, 1], got {0}")]
    InvalidP(f64),

    #[error("EAF must be in [0, 1], got {0}")]
    InvalidEaf(f64),

    #[error("MAF must be in [0, 0.5], got {0}")]
    InvalidMaf(f64),
}

/// One standardized association record.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub snpid: SnpId,
    pub chrom: u32,
    pub bp: u64,
    pub rsid: Option<String>,
    pub ea: String,
    pub nea: String,
    pub eaf: Option<f64>,
    pub maf: Option<f64>,
    pub beta: f64,
    pub se: f64,
    pub p: f64,
}

impl Variant {
    /// Validate the fields and derive the SNPID. Alleles are upper-cased.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chrom: u32,
        bp: u64,
        rsid: Option<String>,
        ea: &str,
        nea: &str,
        eaf: Option<f64>,
        maf: Option<f64>,
        beta: f64,
        se: f64,
        p: f64,
    ) -> Result<Self, VariantError> {
        let ea = ea.trim().to_ascii_uppercase();
        let nea = nea.trim().to_ascii_uppercase();
        if ea.is_empty() || nea.is_empty() {
            return Err(VariantError::EmptyAllele);
        }
        if ea == nea {
            return Err(VariantError::IdenticalAlleles(ea));
        }
        if !se.is_finite() || se <= 0.0 {
            return Err(VariantError::InvalidSe(se));
        }
        if !beta.is_finite() {
            return Err(VariantError::InvalidBeta(beta));
        }
        if !(p > 0.0 && p <= 1.0) {
            return Err(VariantError::InvalidP(p));
        }
        if let Some(f) = eaf {
            if !(0.0..=1.0).contains(&f) {
                return Err(VariantError::InvalidEaf(f));
            }
        }
        if let Some(f) = maf {
            if !(0.0..=0.5).contains(&f) {
                return Err(VariantError::InvalidMaf(f));
            }
        }

        Ok(Variant {
            snpid: SnpId::new(chrom, bp, &ea, &nea),
            chrom,
            bp,
            rsid,
            ea,
            nea,
            eaf,
            maf,
            beta,
            se,
            p,
        })
    }

    /// Z statistic BETA / SE.
    pub fn z(&self) -> f64 {
        self.beta / self.se
    }
}

/// Significance order: P ascending, then BP, then SNPID.
pub fn significance_order(a: &Variant, b: &Variant) -> Ordering {
    a.p.total_cmp(&b.p)
        .then(a.bp.cmp(&b.bp))
        .then_with(|| a.snpid.cmp(&b.snpid))
}

/// Genomic order: CHR, then BP, then SNPID.
pub fn genomic_order(a: &Variant, b: &Variant) -> Ordering {
    a.chrom
        .cmp(&b.chrom)
        .then(a.bp.cmp(&b.bp))
        .then_with(|| a.snpid.cmp(&b.snpid))
}

/// Parse a chromosome label. Accepts an optional `chr` prefix and maps X to 23.
pub fn parse_chrom(s: &str) -> Option<u32> {
    let s = s.trim();
    let s = s
        .strip_prefix("chr")
        .or_else(|| s.strip_prefix("CHR"))
        .unwrap_or(s);
    if s.eq_ignore_ascii_case("x") {
        return Some(CHROM_X);
    }
    match s.parse::<u32>() {
        Ok(c) if (1..=CHROM_X).contains(&c) => Some(c),
        _ => None,
    }
}

/// Keep one record per SNPID (the lowest P) and sort by genomic position.
///
/// Returns the deduplicated variants and the number of records dropped.
pub fn make_snpid_unique(variants: Vec<Variant>) -> (Vec<Variant>, usize) {
    let n_in = variants.len();
    let mut best: HashMap<SnpId, Variant> = HashMap::with_capacity(n_in);
    for v in variants {
        match best.get(&v.snpid) {
            Some(kept) if significance_order(kept, &v) != Ordering::Greater => {}
            _ => {
                best.insert(v.snpid.clone(), v);
            }
        }
    }
    let mut out: Vec<Variant> = best.into_values().collect();
    out.sort_by(genomic_order);
    let dropped = n_in - out.len();
    (out, dropped)
}
