//! Summarize an LD reference panel per chromosome.
//!
//! easyfinemap validate-ldref --ldref panel.chr{chrom} --output report.txt

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use rayon::prelude::*;
use tracing::{info, warn};

use efm_core::ld::PlinkLdReference;
use efm_geno::plink::AlleleStats;

use super::write_output;

#[derive(Args)]
pub struct ValidateLdrefArgs {
    /// LD reference PLINK prefix; may contain {chrom}
    #[arg(long)]
    ldref: String,

    /// Report file (CHR N_VARIANTS N_DUPLICATED N_LOW_MAC N_SAMPLES)
    #[arg(long)]
    output: String,

    /// Variants with a minor allele count below this are counted as low MAC
    #[arg(long, default_value = "10")]
    mac: f64,
}

struct ChromReport {
    chrom: u32,
    n_variants: usize,
    n_duplicated: usize,
    n_low_mac: usize,
    n_samples: usize,
}

fn check_chrom(reference: &PlinkLdReference, chrom: u32, min_mac: f64) -> Result<ChromReport> {
    let reader = reference
        .reader(chrom)
        .with_context(|| format!("Failed to open the panel for chromosome {chrom}"))?;
    let mut seen = HashSet::new();
    let mut report = ChromReport {
        chrom,
        n_variants: 0,
        n_duplicated: 0,
        n_low_mac: 0,
        n_samples: reader.n_samples(),
    };
    for (i, entry) in reader.bim().iter().enumerate() {
        if entry.chrom != Some(chrom) {
            continue;
        }
        report.n_variants += 1;
        if let Some(id) = entry.snpid() {
            if !seen.insert(id) {
                report.n_duplicated += 1;
            }
        }
        let stats = AlleleStats::from_dosages(&reader.read_dosages(i)?);
        if stats.mac < min_mac {
            report.n_low_mac += 1;
        }
    }
    Ok(report)
}

pub fn run(args: ValidateLdrefArgs, threads: usize) -> Result<()> {
    info!("=== Validate LD reference ===");
    let reference = PlinkLdReference::new(args.ldref.clone());
    let chroms = reference.chromosomes()?;
    if chroms.is_empty() {
        bail!("No chromosome found for LD reference {}", args.ldref);
    }

    // Work is partitioned by chromosome; more workers would sit idle.
    let n_workers = threads.clamp(1, chroms.len());
    info!("Checking {} chromosomes with {} workers", chroms.len(), n_workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .build()
        .context("Failed to build the validation thread pool")?;
    let reports: Vec<ChromReport> = pool.install(|| {
        chroms
            .par_iter()
            .map(|&c| check_chrom(&reference, c, args.mac))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut out = String::from("CHR\tN_VARIANTS\tN_DUPLICATED\tN_LOW_MAC\tN_SAMPLES\n");
    for r in &reports {
        if r.n_duplicated > 0 {
            warn!("chr{}: {} duplicated SNPIDs", r.chrom, r.n_duplicated);
        }
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            r.chrom, r.n_variants, r.n_duplicated, r.n_low_mac, r.n_samples
        )?;
    }
    write_output(Path::new(&args.output), out.as_bytes())?;
    info!("Report written to {}", args.output);
    Ok(())
}
