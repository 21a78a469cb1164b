//! LD clumping: a lead claims nearby candidates in LD with it.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use efm_geno::Variant;

use crate::ld::{LdProvider, LdSlice};

use super::merger::{merge_windows, radius_window, Mergeable};
use super::LocusCluster;

/// Claims candidates with r² >= `r2` to the lead. Without LD (the
/// reference could not be read for the chromosome) it claims every
/// candidate in the window.
pub struct ClumpStrategy<'s> {
    pub radius_kb: u64,
    pub r2: f64,
    pub ld: Option<&'s LdSlice>,
}

impl Mergeable for ClumpStrategy<'_> {
    fn window(&self, lead: &Variant) -> (u64, u64) {
        radius_window(lead.bp, self.radius_kb)
    }

    fn mergeable(&self, lead: &Variant, candidate: &Variant) -> bool {
        match self.ld {
            Some(ld) => ld.r2(&lead.snpid, &candidate.snpid) >= self.r2,
            None => true,
        }
    }
}

/// Clump each chromosome of the pool with LD from `ld`.
pub fn clump_clusters(
    pool: &[&Variant],
    radius_kb: u64,
    r2: f64,
    ld: &dyn LdProvider,
) -> Vec<LocusCluster> {
    let mut by_chrom: BTreeMap<u32, Vec<&Variant>> = BTreeMap::new();
    for &v in pool {
        by_chrom.entry(v.chrom).or_default().push(v);
    }

    let per_chrom: Vec<Vec<LocusCluster>> = by_chrom
        .into_par_iter()
        .map(|(chrom, vars)| {
            let slice = match ld.ld_slice(chrom, &vars) {
                Ok(s) => {
                    debug!("chr{}: {} of {} candidates in the LD reference", chrom, s.len(), vars.len());
                    Some(s)
                }
                Err(e) => {
                    warn!("chr{}: {}; clumping by distance only", chrom, e);
                    None
                }
            };
            let strategy = ClumpStrategy {
                radius_kb,
                r2,
                ld: slice.as_ref(),
            };
            merge_windows(&vars, &strategy)
                .clusters
                .iter()
                .map(|c| LocusCluster::from_merge(c, None))
                .collect()
        })
        .collect();

    per_chrom.into_iter().flatten().collect()
}
