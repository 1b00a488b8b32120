use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use branchcov::cli;
use branchcov::config::Config;

/// branchcov: overlay branch and path coverage onto rendered coverage reports.
#[derive(Parser)]
#[command(name = "branchcov", version, about)]
struct Cli {
    /// JSON config file providing defaults for every option.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug details (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch the Clover summary, file pages and directory pages in place.
    Overlay {
        /// Branch/path dataset (JSON).
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Root of the rendered HTML report.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Clover XML summary to patch.
        #[arg(long)]
        clover: Option<PathBuf>,

        /// Prefix stripped from dataset paths (default: their common directory).
        #[arg(long)]
        source_root: Option<PathBuf>,

        /// Ignore files whose path contains this marker.
        #[arg(long)]
        exclude: Option<String>,

        /// File name suffix of pages rendered for source files.
        #[arg(long)]
        leaf_suffix: Option<String>,

        /// Keep a pristine copy of the Clover summary (`<clover>.orig`).
        #[arg(long)]
        backup: bool,

        /// Do not delete the dataset after a successful run.
        #[arg(long)]
        keep_dataset: bool,
    },

    /// Show branch and path totals of a dataset.
    Summary {
        /// Branch/path dataset (JSON).
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Ignore files whose path contains this marker.
        #[arg(long)]
        exclude: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    let output = match cli.command {
        Commands::Overlay {
            dataset,
            output,
            clover,
            source_root,
            exclude,
            leaf_suffix,
            backup,
            keep_dataset,
        } => {
            if let Some(dataset) = dataset {
                config.dataset = dataset;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if clover.is_some() {
                config.clover = clover;
            }
            if source_root.is_some() {
                config.source_root = source_root;
            }
            if let Some(exclude) = exclude {
                config.exclude = exclude;
            }
            if let Some(leaf_suffix) = leaf_suffix {
                config.leaf_suffix = leaf_suffix;
            }
            config.backup |= backup;
            if keep_dataset {
                config.remove_dataset = false;
            }
            cli::cmd_overlay(&config)?
        }
        Commands::Summary { dataset, exclude } => {
            let dataset = dataset.unwrap_or(config.dataset);
            let exclude = exclude.unwrap_or(config.exclude);
            cli::cmd_summary(&dataset, &exclude)?
        }
    };

    print!("{output}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
