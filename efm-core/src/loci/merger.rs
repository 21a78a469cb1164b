//! Greedy window merging shared by all locus strategies.

use std::collections::HashMap;

use efm_geno::variant::significance_order;
use efm_geno::Variant;

/// Strategy interface of the window merger.
pub trait Mergeable {
    /// Physical window `[start, end]` scanned around a lead.
    fn window(&self, lead: &Variant) -> (u64, u64);

    /// Whether `candidate` is not independent of `lead` and is claimed by it.
    fn mergeable(&self, lead: &Variant, candidate: &Variant) -> bool;

    /// Whether `candidate` may start a new cluster.
    fn may_lead(&self, _candidate: &Variant) -> bool {
        true
    }
}

/// A lead and the candidates it claimed (lead excluded).
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    pub lead: &'a Variant,
    pub claimed: Vec<&'a Variant>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeResult<'a> {
    /// Clusters in selection order.
    pub clusters: Vec<Cluster<'a>>,
    /// Candidates that could not lead and were never claimed.
    pub orphans: Vec<&'a Variant>,
}

/// `[bp - radius, bp + radius]`, clipped at 0.
pub fn radius_window(bp: u64, radius_kb: u64) -> (u64, u64) {
    let r = radius_kb.saturating_mul(1000);
    (bp.saturating_sub(r), bp.saturating_add(r))
}

/// Partition `candidates` into clusters.
///
/// Candidates are visited by increasing P (ties by BP, then SNPID). The
/// first unclaimed candidate allowed to lead starts a cluster and claims
/// every later-ranked unclaimed candidate of its chromosome inside its
/// window for which [`Mergeable::mergeable`] holds, so a lead always has
/// the smallest P of its cluster.
pub fn merge_windows<'a, M>(candidates: &[&'a Variant], strategy: &M) -> MergeResult<'a>
where
    M: Mergeable + ?Sized,
{
    let n = candidates.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| significance_order(candidates[a], candidates[b]));
    let mut rank = vec![0usize; n];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }

    // Per-chromosome candidate indices sorted by position.
    let mut by_chrom: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, v) in candidates.iter().enumerate() {
        by_chrom.entry(v.chrom).or_default().push(i);
    }
    for idx in by_chrom.values_mut() {
        idx.sort_by_key(|&i| (candidates[i].bp, rank[i]));
    }

    let mut claimed = vec![false; n];
    let mut clusters = Vec::new();

    for &i in &order {
        if claimed[i] || !strategy.may_lead(candidates[i]) {
            continue;
        }
        let lead = candidates[i];
        claimed[i] = true;

        let (start, end) = strategy.window(lead);
        let mut members = Vec::new();
        if let Some(idx) = by_chrom.get(&lead.chrom) {
            let lo = idx.partition_point(|&j| candidates[j].bp < start);
            let hi = idx.partition_point(|&j| candidates[j].bp <= end);
            for &j in &idx[lo..hi] {
                if claimed[j] || rank[j] < rank[i] {
                    continue;
                }
                if strategy.mergeable(lead, candidates[j]) {
                    claimed[j] = true;
                    members.push(candidates[j]);
                }
            }
        }
        clusters.push(Cluster {
            lead,
            claimed: members,
        });
    }

    let orphans = order
        .iter()
        .filter(|&&i| !claimed[i])
        .map(|&i| candidates[i])
        .collect();

    MergeResult { clusters, orphans }
}
