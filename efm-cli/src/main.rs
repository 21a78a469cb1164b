//! easyfinemap: independent loci and fine-mapping from GWAS summary statistics.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "easyfinemap",
    version,
    about = "Identify independent loci and fine-map GWAS summary statistics",
    long_about = "Partitions GWAS summary statistics into independent loci by distance,\n\
                   LD clumping or conditional selection, and computes per-locus posterior\n\
                   probabilities of causality and credible sets."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify independent loci
    GetLoci(commands::get_loci::GetLociArgs),

    /// Fine-map identified loci
    Finemap(commands::finemap::FinemapArgs),

    /// Validate and standardize summary statistics
    ValidateSumstats(commands::validate_sumstats::ValidateSumstatsArgs),

    /// Summarize an LD reference panel per chromosome
    ValidateLdref(commands::validate_ldref::ValidateLdrefArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Set up thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("easyfinemap v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::GetLoci(args) => commands::get_loci::run(args),
        Commands::Finemap(args) => commands::finemap::run(args),
        Commands::ValidateSumstats(args) => commands::validate_sumstats::run(args),
        Commands::ValidateLdref(args) => commands::validate_ldref::run(args, cli.threads),
    }
}
