//! Fine-map identified loci.
//!
//! easyfinemap finemap --sumstats ... --loci prefix.loci.txt --output ... [--conditional --ldref ...]

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use efm_core::finemap::{finemap_all_loci, write_finemap, FinemapConfig, FinemapContext, Method};
use efm_core::ld::PlinkLdReference;
use efm_core::loci::output::read_loci;
use efm_geno::sumstats::read_sumstats;
use efm_geno::variant::make_snpid_unique;

use super::write_output;

#[derive(Args)]
pub struct FinemapArgs {
    /// Summary statistics (CHR BP rsID EA NEA EAF MAF BETA SE P), plain or .gz
    #[arg(long)]
    sumstats: String,

    /// Loci table written by get-loci
    #[arg(long)]
    loci: String,

    /// Output file (.gz for compressed output)
    #[arg(long)]
    output: String,

    /// Methods (comma-separated): abf, finemap, paintor, caviarbf, susie,
    /// polyfun_finemap, polyfun_susie, or all
    #[arg(long, default_value = "abf")]
    methods: String,

    /// Prior standard deviation of effect sizes for ABF
    #[arg(long, default_value = "0.2")]
    var_prior: f64,

    /// Cumulative posterior probability of the credible set
    #[arg(long)]
    credible_threshold: Option<f64>,

    /// Method whose probabilities define the credible set
    #[arg(long)]
    credible_method: Option<String>,

    /// Maximum number of causal variants per locus
    #[arg(long, default_value = "1")]
    max_causal: usize,

    /// GWAS sample size
    #[arg(long)]
    sample_size: Option<f64>,

    /// LD reference PLINK prefix; may contain {chrom}
    #[arg(long)]
    ldref: Option<String>,

    /// Ignore LD reference variants with a minor allele count below this
    #[arg(long, default_value = "10")]
    ldref_mac: f64,

    /// Condition each locus on the other lead SNPs nearby
    #[arg(long, default_value = "false")]
    conditional: bool,

    /// Window for the lead SNPs to condition on (kb)
    #[arg(long, default_value = "1000")]
    cond_snps_wind_kb: u64,

    /// Use the reference panel allele frequency instead of EAF
    #[arg(long, default_value = "false")]
    use_ref_eaf: bool,

    /// Keep at most this many of the most significant variants per locus
    #[arg(long, default_value = "5000")]
    max_variants: usize,
}

impl FinemapArgs {
    fn config(&self) -> Result<FinemapConfig> {
        let methods = Method::parse_list(&self.methods)?;
        let credible_method = self
            .credible_method
            .as_deref()
            .map(str::parse::<Method>)
            .transpose()?;
        Ok(FinemapConfig {
            methods,
            prior_w: self.var_prior,
            credible_threshold: self.credible_threshold,
            credible_method,
            max_causal: self.max_causal,
            sample_size: self.sample_size,
            use_ref_eaf: self.use_ref_eaf,
            conditional: self.conditional,
            cond_snps_wind_kb: self.cond_snps_wind_kb,
            max_variants: self.max_variants,
        })
    }
}

pub fn run(args: FinemapArgs) -> Result<()> {
    info!("=== Fine-mapping ===");
    let config = args.config()?;
    config.validate()?;

    let variants = read_sumstats(&args.sumstats)?;
    let (variants, n_dup) = make_snpid_unique(variants);
    if n_dup > 0 {
        info!("Dropped {} duplicated SNPIDs, keeping the lowest P", n_dup);
    }
    let file = File::open(&args.loci).with_context(|| format!("Failed to open {}", args.loci))?;
    let loci = read_loci(BufReader::new(file), &args.loci)?;
    info!("Loaded {} variants and {} loci", variants.len(), loci.len());

    let mut ctx = FinemapContext::default();
    if let Some(ldref) = &args.ldref {
        ctx.ld = Some(Arc::new(
            PlinkLdReference::new(ldref.clone()).with_min_mac(args.ldref_mac),
        ));
    }

    let report = finemap_all_loci(&variants, &loci, &config, &ctx).context("Fine-mapping failed")?;
    for f in &report.failures {
        warn!("{} {}: {}", f.lead_snp, f.method, f.reason);
    }

    let mut buf = Vec::new();
    write_finemap(&mut buf, &report)?;
    write_output(Path::new(&args.output), &buf)?;
    info!("{} rows written to {}", report.rows.len(), args.output);
    Ok(())
}
