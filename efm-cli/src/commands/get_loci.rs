//! Identify independent loci.
//!
//! easyfinemap get-loci --sumstats ... --output-prefix ... [--method clumping --ldref ...]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use efm_core::cojo::CojoParams;
use efm_core::ld::PlinkLdReference;
use efm_core::loci::output::{write_lead_snps, write_loci, write_params};
use efm_core::loci::{identify_loci, LociConfig, LociContext, StrategyParams};
use efm_geno::regions::{read_chrom_sizes, read_ld_blocks};
use efm_geno::sumstats::read_sumstats;
use efm_geno::variant::make_snpid_unique;

use super::write_output;

#[derive(Args)]
pub struct GetLociArgs {
    /// Summary statistics (CHR BP rsID EA NEA EAF MAF BETA SE P), plain or .gz
    #[arg(long)]
    sumstats: String,

    /// Output prefix: writes .loci.txt, .leadsnp.txt and .params.json
    #[arg(long)]
    output_prefix: String,

    /// Locus identification method: distance, clumping, or conditional
    #[arg(long, default_value = "distance")]
    method: String,

    /// Significance threshold for candidate variants
    #[arg(long, default_value = "5e-8")]
    sig_threshold: f64,

    /// Extension around each lead SNP when building loci (kb)
    #[arg(long, default_value = "500")]
    loci_extension: u64,

    /// Distance method: merge radius (kb)
    #[arg(long, default_value = "500")]
    distance: u64,

    /// Clumping method: window (kb)
    #[arg(long, default_value = "500")]
    clump_kb: u64,

    /// Clumping method: r² threshold
    #[arg(long, default_value = "0.1")]
    clump_r2: f64,

    /// Conditional method: window around each signal (kb)
    #[arg(long, default_value = "500")]
    cojo_window_kb: u64,

    /// Conditional method: collinearity threshold
    #[arg(long, default_value = "0.9")]
    cojo_collinear: f64,

    /// Conditional method: maximum |EAF - reference EAF|
    #[arg(long, default_value = "0.2")]
    diff_freq: f64,

    /// GWAS sample size (conditional method)
    #[arg(long)]
    sample_size: Option<f64>,

    /// Use the reference panel allele frequency instead of EAF
    #[arg(long, default_value = "false")]
    use_ref_eaf: bool,

    /// Hand only significant variants to conditional selection
    #[arg(long, default_value = "false")]
    only_use_sig_snps: bool,

    /// LD reference PLINK prefix; may contain {chrom}
    #[arg(long)]
    ldref: Option<String>,

    /// Ignore LD reference variants with a minor allele count below this
    #[arg(long, default_value = "10")]
    ldref_mac: f64,

    /// LD block file (CHR START END)
    #[arg(long)]
    ldblock: Option<String>,

    /// Chromosome sizes (CHR LENGTH) used to clip locus ends
    #[arg(long)]
    chrom_sizes: Option<String>,

    /// Merge overlapping loci
    #[arg(long, default_value = "false")]
    merge_loci: bool,
}

impl GetLociArgs {
    fn config(&self) -> Result<LociConfig> {
        let strategy = match self.method.to_lowercase().as_str() {
            "distance" => StrategyParams::Distance {
                distance_kb: self.distance,
            },
            "clumping" | "clump" => StrategyParams::Clumping {
                clump_kb: self.clump_kb,
                clump_r2: self.clump_r2,
            },
            "conditional" | "cojo" => StrategyParams::Conditional {
                window_kb: self.cojo_window_kb,
                cojo: CojoParams {
                    sample_size: self.sample_size,
                    p_threshold: self.sig_threshold,
                    collinear: self.cojo_collinear,
                    diff_freq: self.diff_freq,
                    use_ref_eaf: self.use_ref_eaf,
                    ..Default::default()
                },
            },
            _ => bail!("Unknown locus identification method: {}", self.method),
        };
        Ok(LociConfig {
            sig_threshold: self.sig_threshold,
            loci_extension_kb: self.loci_extension,
            merge_loci: self.merge_loci,
            only_use_sig_snps: self.only_use_sig_snps,
            strategy,
        })
    }
}

pub fn run(args: GetLociArgs) -> Result<()> {
    info!("=== Locus identification ===");
    let config = args.config()?;
    info!("Method: {}", config.strategy.name());
    info!("Summary statistics: {}", args.sumstats);

    let variants = read_sumstats(&args.sumstats)?;
    let (variants, n_dup) = make_snpid_unique(variants);
    if n_dup > 0 {
        info!("Dropped {} duplicated SNPIDs, keeping the lowest P", n_dup);
    }
    info!("Loaded {} variants", variants.len());

    let mut ctx = LociContext::default();
    if let Some(ldref) = &args.ldref {
        info!("LD reference: {}", ldref);
        ctx.ld = Some(Arc::new(
            PlinkLdReference::new(ldref.clone()).with_min_mac(args.ldref_mac),
        ));
    }
    if let Some(path) = &args.ldblock {
        let blocks = read_ld_blocks(path)?;
        info!("Loaded {} LD blocks from {}", blocks.len(), path);
        ctx.ld_blocks = Some(blocks);
    }
    if let Some(path) = &args.chrom_sizes {
        ctx.chrom_sizes = Some(read_chrom_sizes(path)?);
    }

    let result = identify_loci(&variants, &config, &ctx).context("Locus identification failed")?;
    info!("Identified {} loci", result.loci.len());

    // Render everything before touching the output directory.
    let mut loci_buf = Vec::new();
    write_loci(&mut loci_buf, &result.loci)?;
    let mut lead_buf = Vec::new();
    write_lead_snps(&mut lead_buf, &result.lead_snps)?;
    let mut params_buf = Vec::new();
    write_params(&mut params_buf, &config)?;

    let out = |suffix: &str| PathBuf::from(format!("{}.{}", args.output_prefix, suffix));
    write_output(&out("loci.txt"), &loci_buf)?;
    write_output(&out("leadsnp.txt"), &lead_buf)?;
    write_output(&out("params.json"), &params_buf)?;

    info!("Results written to {}.loci.txt", args.output_prefix);
    Ok(())
}
