//! Distance strategy: every candidate near a lead belongs to it.

use efm_geno::{LdBlocks, Variant};

use super::merger::{merge_windows, radius_window, Mergeable};
use super::LocusCluster;

/// Fixed radius around the lead, or the LD block containing it.
pub struct DistanceStrategy<'a> {
    pub radius_kb: u64,
    pub blocks: Option<&'a LdBlocks>,
}

impl Mergeable for DistanceStrategy<'_> {
    fn window(&self, lead: &Variant) -> (u64, u64) {
        match self.blocks.and_then(|b| b.containing(lead.chrom, lead.bp)) {
            Some(block) => (block.start, block.end),
            None => radius_window(lead.bp, self.radius_kb),
        }
    }

    fn mergeable(&self, _lead: &Variant, _candidate: &Variant) -> bool {
        true
    }
}

pub fn distance_clusters(
    pool: &[&Variant],
    radius_kb: u64,
    blocks: Option<&LdBlocks>,
) -> Vec<LocusCluster> {
    let strategy = DistanceStrategy { radius_kb, blocks };
    merge_windows(pool, &strategy)
        .clusters
        .iter()
        .map(|c| LocusCluster::from_merge(c, None))
        .collect()
}
