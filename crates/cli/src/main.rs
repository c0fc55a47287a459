//! Power Dataset Builder CLI
//!
//! Normalizes monitoring exports, builds joined power datasets and
//! writes reproducible train/test splits.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{build, normalize, split};
use dataset_lib::builder::{ENERGY_PROFILE, VM_POWER_PROFILE};
use dataset_lib::{render_metrics, BucketWidth, SourceKind};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::PipelineConfig;

/// Power Dataset Builder CLI
#[derive(Parser)]
#[command(name = "dsb")]
#[command(author, version, about = "CLI for the Power Dataset Builder", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/dsb/config.toml when present)
    #[arg(long, global = true, env = "DSB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Write Prometheus metrics of the run to this file
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pivot raw long-format exports of one source into wide tables
    Normalize {
        /// Source kind (kepler, k8s, proxmox, pdu, scaphandre)
        #[arg(long, short)]
        source: SourceKind,

        /// Directory holding the raw exports
        #[arg(long, short)]
        dir: PathBuf,

        /// Output file name inside <dir>/processed
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Build a joined dataset
    #[command(subcommand)]
    Build(BuildCommands),

    /// Split a built dataset into train and test partitions
    Split {
        /// Dataset CSV written by `dsb build`
        dataset: PathBuf,

        /// Profile the dataset was built with (energy, vm-power)
        #[arg(long, short, default_value = "energy")]
        profile: String,

        /// Directory for x_train, x_test, y_train and y_test
        #[arg(long, short)]
        out_dir: PathBuf,

        /// Feature columns, comma separated
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Target column
        #[arg(long)]
        target: Option<String>,

        /// Fraction of rows held out for testing
        #[arg(long)]
        test_size: Option<f64>,

        /// Shuffle seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum BuildCommands {
    /// Container energy dataset from k8s usage and kepler counters
    Energy {
        /// Directory of k8s exports
        #[arg(long)]
        k8s_dir: PathBuf,

        /// Directory of kepler exports
        #[arg(long)]
        kepler_dir: PathBuf,

        /// Dataset output file
        #[arg(long, short, default_value = "energy_dataset.csv")]
        output: PathBuf,

        /// Alignment bucket, e.g. 1min or 30s
        #[arg(long)]
        bucket: Option<BucketWidth>,

        /// Also write a train/test split into this directory
        #[arg(long)]
        split_dir: Option<PathBuf>,
    },

    /// VM power dataset from proxmox usage and scaphandre power
    VmPower {
        /// Directory of proxmox exports
        #[arg(long)]
        proxmox_dir: PathBuf,

        /// Directory of scaphandre exports
        #[arg(long)]
        scaphandre_dir: PathBuf,

        /// Dataset output file
        #[arg(long, short, default_value = "vm_power_dataset.csv")]
        output: PathBuf,

        /// Alignment bucket, e.g. 1min or 30s
        #[arg(long)]
        bucket: Option<BucketWidth>,

        /// Substring VM names must contain (empty keeps every VM)
        #[arg(long)]
        vm_filter: Option<String>,

        /// Also write a train/test split into this directory
        #[arg(long)]
        split_dir: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    if let Err(err) = run(cli) {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref())?;
    debug!(bucket = %config.bucket, test_size = config.test_size, "Configuration loaded");

    match cli.command {
        Commands::Normalize { source, dir, output } => {
            normalize::run(source, &dir, output.as_deref(), cli.format)?;
        }
        Commands::Build(build_cmd) => {
            let (profile, args) = match build_cmd {
                BuildCommands::Energy {
                    k8s_dir,
                    kepler_dir,
                    output,
                    bucket,
                    split_dir,
                } => (
                    config.profile(ENERGY_PROFILE)?,
                    build::BuildArgs {
                        left_dir: k8s_dir,
                        right_dir: kepler_dir,
                        output,
                        bucket: bucket.unwrap_or(config.bucket),
                        split_dir,
                        split: config.split_options(),
                    },
                ),
                BuildCommands::VmPower {
                    proxmox_dir,
                    scaphandre_dir,
                    output,
                    bucket,
                    vm_filter,
                    split_dir,
                } => {
                    let filter = match vm_filter.as_deref().map(str::trim) {
                        Some("") => None,
                        Some(needle) => Some(needle),
                        None => config.vm_filter(),
                    };
                    (
                        config.profile_with_filter(VM_POWER_PROFILE, filter)?,
                        build::BuildArgs {
                            left_dir: proxmox_dir,
                            right_dir: scaphandre_dir,
                            output,
                            bucket: bucket.unwrap_or(config.bucket),
                            split_dir,
                            split: config.split_options(),
                        },
                    )
                }
            };
            info!(profile = %profile.name, bucket = %args.bucket, "Building dataset");
            build::run(profile, &args, cli.format)?;
        }
        Commands::Split {
            dataset,
            profile,
            out_dir,
            features,
            target,
            test_size,
            seed,
        } => {
            let mut profile = config.profile(&profile)?;
            if let Some(features) = features {
                profile = profile.with_features(features);
            }
            if let Some(target) = target {
                profile = profile.with_target(target);
            }
            profile.validate()?;

            let mut options = config.split_options();
            if let Some(test_size) = test_size {
                options.test_size = test_size;
            }
            if let Some(seed) = seed {
                options.seed = seed;
            }
            split::run(&profile, &dataset, &out_dir, &options, cli.format)?;
        }
    }

    if let Some(path) = &cli.metrics_file {
        let metrics = render_metrics().context("Failed to render metrics")?;
        std::fs::write(path, metrics)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }
    Ok(())
}
