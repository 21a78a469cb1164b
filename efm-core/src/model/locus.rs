//! Genomic interval anchored by one lead variant.

use efm_geno::{SnpId, Variant};

/// One row of the loci table.
#[derive(Debug, Clone, PartialEq)]
pub struct Locus {
    pub chrom: u32,
    pub start: u64,
    pub end: u64,
    pub lead_snp: SnpId,
    pub lead_snp_p: f64,
    pub lead_snp_bp: u64,
}

impl Locus {
    pub fn new(chrom: u32, start: u64, end: u64, lead: &Variant) -> Self {
        Locus {
            chrom,
            start,
            end,
            lead_snp: lead.snpid.clone(),
            lead_snp_p: lead.p,
            lead_snp_bp: lead.bp,
        }
    }

    /// Closed-interval overlap; touching intervals count as overlapping.
    pub fn overlaps(&self, other: &Locus) -> bool {
        self.chrom == other.chrom && other.start <= self.end && self.start <= other.end
    }

    pub fn contains(&self, chrom: u32, bp: u64) -> bool {
        self.chrom == chrom && self.start <= bp && bp <= self.end
    }
}
