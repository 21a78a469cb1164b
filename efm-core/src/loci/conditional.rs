//! Conditional strategy: loci are anchored on independent signals found
//! by stepwise conditional selection.
//!
//! Selection runs per window (the radius window of a distance cluster, or
//! its LD block when blocks are given). Only selected signals may lead;
//! every other candidate near a signal is claimed by it.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use efm_geno::{LdBlocks, SnpId, Variant};

use crate::cojo::{ConditionalSelector, FallbackReason, JointSignal, SelectionError, SelectionOutcome};

use super::distance::distance_clusters;
use super::merger::{merge_windows, radius_window, Mergeable};
use super::LocusCluster;

pub struct ConditionalStrategy<'s> {
    pub radius_kb: u64,
    pub selected: &'s HashMap<SnpId, Option<JointSignal>>,
}

impl Mergeable for ConditionalStrategy<'_> {
    fn window(&self, lead: &Variant) -> (u64, u64) {
        radius_window(lead.bp, self.radius_kb)
    }

    fn mergeable(&self, _lead: &Variant, candidate: &Variant) -> bool {
        !self.selected.contains_key(&candidate.snpid)
    }

    fn may_lead(&self, candidate: &Variant) -> bool {
        self.selected.contains_key(&candidate.snpid)
    }
}

/// Region handed to the selector in one call.
#[derive(Debug)]
struct Window<'a> {
    chrom: u32,
    start: u64,
    end: u64,
    candidates: Vec<&'a Variant>,
}

/// Selection windows: the LD block of each distance cluster, or the
/// cluster lead's radius window outside blocks. Overlapping windows of a
/// chromosome are joined so that nearby signals are selected jointly.
fn windows<'a>(
    pool: &[&'a Variant],
    radius_kb: u64,
    blocks: Option<&LdBlocks>,
) -> Vec<Window<'a>> {
    let index: HashMap<&SnpId, &'a Variant> = pool.iter().map(|&v| (&v.snpid, v)).collect();
    let mut spans: Vec<Window<'a>> = distance_clusters(pool, radius_kb, blocks)
        .into_iter()
        .map(|c| {
            let lead = &c.lead.variant;
            let (start, end) = match blocks.and_then(|b| b.containing(lead.chrom, lead.bp)) {
                Some(b) => (b.start, b.end),
                None => radius_window(lead.bp, radius_kb),
            };
            let candidates = std::iter::once(lead)
                .chain(c.claimed.iter())
                .filter_map(|v| index.get(&v.snpid).copied())
                .collect();
            Window {
                chrom: lead.chrom,
                start,
                end,
                candidates,
            }
        })
        .collect();
    spans.sort_by_key(|w| (w.chrom, w.start, w.end));

    let mut joined: Vec<Window<'a>> = Vec::with_capacity(spans.len());
    for w in spans {
        match joined.last_mut() {
            Some(prev) if prev.chrom == w.chrom && w.start <= prev.end => {
                prev.end = prev.end.max(w.end);
                prev.candidates.extend(w.candidates);
            }
            _ => joined.push(w),
        }
    }
    joined
}

/// Run selection on every window and anchor clusters on the signals.
pub fn conditional_clusters(
    variants: &[Variant],
    pool: &[&Variant],
    radius_kb: u64,
    only_use_sig_snps: bool,
    blocks: Option<&LdBlocks>,
    selector: &dyn ConditionalSelector,
) -> Result<Vec<LocusCluster>, SelectionError> {
    // All input variants per chromosome, sorted by position.
    let mut by_chrom: HashMap<u32, Vec<&Variant>> = HashMap::new();
    for v in variants {
        by_chrom.entry(v.chrom).or_default().push(v);
    }
    for vs in by_chrom.values_mut() {
        vs.sort_by_key(|v| v.bp);
    }

    let windows = windows(pool, radius_kb, blocks);
    debug!("conditional selection over {} windows", windows.len());

    let per_window: Vec<Vec<LocusCluster>> = windows
        .par_iter()
        .map(|w| {
            let region: Vec<&Variant> = if only_use_sig_snps {
                w.candidates.clone()
            } else {
                let all = by_chrom.get(&w.chrom).map(Vec::as_slice).unwrap_or(&[]);
                let lo = all.partition_point(|v| v.bp < w.start);
                let hi = all.partition_point(|v| v.bp <= w.end);
                all[lo..hi].to_vec()
            };
            select_window(w, &region, radius_kb, blocks, selector)
        })
        .collect::<Result<_, _>>()?;

    Ok(per_window.into_iter().flatten().collect())
}

fn select_window(
    w: &Window<'_>,
    region: &[&Variant],
    radius_kb: u64,
    blocks: Option<&LdBlocks>,
    selector: &dyn ConditionalSelector,
) -> Result<Vec<LocusCluster>, SelectionError> {
    let label = format!("chr{}:{}-{}", w.chrom, w.start, w.end);

    let outcome = match selector.select(w.chrom, region)? {
        SelectionOutcome::Selected(signals) if signals.is_empty() => {
            SelectionOutcome::Fallback(FallbackReason::NoSignal)
        }
        other => other,
    };

    let mut selected: HashMap<SnpId, Option<JointSignal>> = HashMap::new();
    match outcome {
        SelectionOutcome::Selected(signals) => {
            debug!("{}: {} independent signals", label, signals.len());
            for s in signals {
                selected.insert(s.snpid.clone(), Some(s));
            }
        }
        SelectionOutcome::Fallback(reason) => {
            // Each distance cluster of the window keeps its top variant as a lead.
            let clusters = distance_clusters(&w.candidates, radius_kb, blocks);
            warn!(
                "{}: {}; using the most significant variant of each of {} regions as its signal",
                label,
                reason,
                clusters.len()
            );
            return Ok(clusters);
        }
    }

    // Selected signals may be marginally non-significant; they still lead.
    let mut candidates = w.candidates.clone();
    for &v in region {
        if selected.contains_key(&v.snpid) && !candidates.iter().any(|c| c.snpid == v.snpid) {
            candidates.push(v);
        }
    }

    let strategy = ConditionalStrategy {
        radius_kb,
        selected: &selected,
    };
    let merged = merge_windows(&candidates, &strategy);
    if !merged.orphans.is_empty() {
        warn!(
            "{}: {} significant variants are neither signals nor near one and were not assigned",
            label,
            merged.orphans.len()
        );
    }

    Ok(merged
        .clusters
        .iter()
        .map(|c| {
            let joint = selected.get(&c.lead.snpid).cloned().flatten();
            LocusCluster::from_merge(c, joint)
        })
        .collect())
}
