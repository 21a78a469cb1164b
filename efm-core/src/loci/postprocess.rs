//! Turn clusters into loci: boundaries, optional merging, ordering.

use tracing::{info, warn};

use efm_geno::variant::significance_order;

use crate::model::Locus;

use super::merger::radius_window;
use super::{LeadSnp, LociConfig, LociContext, LociResult, LocusCluster};

/// Locus boundaries of a lead: its LD block when blocks are given and one
/// contains it, else `BP ± extension`, clipped to the chromosome length.
fn boundaries(lead: &LeadSnp, config: &LociConfig, ctx: &LociContext) -> (u64, u64) {
    let v = &lead.variant;
    let (start, mut end) = match ctx.ld_blocks.as_ref().and_then(|b| b.containing(v.chrom, v.bp)) {
        Some(block) => (block.start, block.end),
        None => radius_window(v.bp, config.loci_extension_kb),
    };
    if let Some(len) = ctx.chrom_sizes.as_ref().and_then(|s| s.length(v.chrom)) {
        end = end.min(len);
    }
    if end <= start {
        end = start + 1;
    }
    (start, end)
}

/// Build the final loci and lead-SNP tables from strategy clusters.
pub fn build_loci(clusters: Vec<LocusCluster>, config: &LociConfig, ctx: &LociContext) -> LociResult {
    let mut rows: Vec<(Locus, LeadSnp)> = clusters
        .iter()
        .map(|c| {
            let (start, end) = boundaries(&c.lead, config, ctx);
            let locus = Locus::new(c.lead.variant.chrom, start, end, &c.lead.variant);
            (locus, c.lead.clone())
        })
        .collect();

    sort_rows(&mut rows);

    let mut overlapping = false;
    if config.merge_loci {
        let n_before = rows.len();
        rows = merge_rows(rows);
        if rows.len() < n_before {
            info!("Merged {} overlapping loci into {}", n_before, rows.len());
        }
    } else {
        let n_overlap = rows
            .windows(2)
            .filter(|w| w[0].0.overlaps(&w[1].0))
            .count();
        if n_overlap > 0 {
            overlapping = true;
            warn!(
                "{} pairs of adjacent loci overlap; enable loci merging to combine them",
                n_overlap
            );
        }
    }

    let (loci, lead_snps) = rows.into_iter().unzip();
    LociResult {
        loci,
        lead_snps,
        overlapping,
        clusters,
    }
}

fn sort_rows(rows: &mut [(Locus, LeadSnp)]) {
    rows.sort_by(|a, b| {
        (a.0.chrom, a.0.start, a.0.end)
            .cmp(&(b.0.chrom, b.0.start, b.0.end))
            .then_with(|| significance_order(&a.1.variant, &b.1.variant))
    });
}

/// Merge overlapping or touching loci (rows sorted by chrom, start).
/// The merged locus keeps the most significant lead.
fn merge_rows(rows: Vec<(Locus, LeadSnp)>) -> Vec<(Locus, LeadSnp)> {
    let mut out: Vec<(Locus, LeadSnp)> = Vec::with_capacity(rows.len());
    for (locus, lead) in rows {
        if let Some((cur, cur_lead)) = out.last_mut() {
            if cur.overlaps(&locus) {
                let start = cur.start.min(locus.start);
                let end = cur.end.max(locus.end);
                if significance_order(&lead.variant, &cur_lead.variant).is_lt() {
                    *cur_lead = lead;
                }
                *cur = Locus::new(cur.chrom, start, end, &cur_lead.variant);
                continue;
            }
        }
        out.push((locus, lead));
    }
    out
}
