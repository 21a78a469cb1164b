//! Validate and standardize summary statistics.
//!
//! easyfinemap validate-sumstats --sumstats ... --output out.txt.gz

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use efm_geno::sumstats::{read_sumstats, write_sumstats};
use efm_geno::variant::make_snpid_unique;

use super::write_output;

#[derive(Args)]
pub struct ValidateSumstatsArgs {
    /// Summary statistics (CHR BP rsID EA NEA EAF MAF BETA SE P), plain or .gz
    #[arg(long)]
    sumstats: String,

    /// Standardized output with a SNPID column (.gz for compressed output)
    #[arg(long)]
    output: String,
}

pub fn run(args: ValidateSumstatsArgs) -> Result<()> {
    info!("=== Validate summary statistics ===");
    let variants = read_sumstats(&args.sumstats)?;
    let n_in = variants.len();
    let (variants, n_dup) = make_snpid_unique(variants);
    info!(
        "{} rows read, {} duplicated SNPIDs dropped, {} variants kept",
        n_in,
        n_dup,
        variants.len()
    );

    let mut buf = Vec::new();
    write_sumstats(&mut buf, &variants)?;
    write_output(Path::new(&args.output), &buf)?;
    info!("Standardized table written to {}", args.output);
    Ok(())
}
