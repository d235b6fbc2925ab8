//! Systematic reweighting of CAF record stores.
//!
//! **Usage:**
//! ```bash
//! update-reweight -c <config.toml> -i <input.caf> -o <output.caf> [-k <key>] [-g <genie.caf>] [-N <n>] [-s <n>]
//! ```
//!
//! Reads every event in the input store, evaluates the configured response
//! providers for each true interaction and writes the augmented events plus a
//! global parameter table to the output store.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{ensure, Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use tracing::{error, info};

use caf_reweight::{
    FileSink, Pipeline, PrimaryRecord, ProviderConfiguration, RunOptions, RunSummary, SecondaryRecord, StoreConfig,
    StoreLayout, TreeReader, DEFAULT_CONFIG_KEY,
};

/// Attach systematic response weights to CAF event records
#[derive(Parser, Debug)]
#[command(name = "update-reweight", disable_help_flag = true)]
struct Args {
    /// Provider configuration file (TOML)
    #[arg(short = 'c', value_name = "CONFIG")]
    config: PathBuf,

    /// Table inside the configuration file holding the provider list
    #[arg(short = 'k', value_name = "KEY", default_value = DEFAULT_CONFIG_KEY)]
    key: String,

    /// Input record store
    #[arg(short = 'i', value_name = "INPUT")]
    input: PathBuf,

    /// Store holding the generator records, if not the input store
    #[arg(short = 'g', value_name = "GENIE")]
    secondary: Option<PathBuf>,

    /// Output record store
    #[arg(short = 'o', value_name = "OUTPUT")]
    output: PathBuf,

    /// Maximum number of events to process
    #[arg(short = 'N', value_name = "N")]
    max_events: Option<usize>,

    /// Number of leading events to skip
    #[arg(short = 's', value_name = "N", default_value_t = 0)]
    skip: usize,

    /// Print help
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("caf_reweight=info,update_reweight=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(summary) => {
            info!(
                records = summary.records_written,
                interactions = summary.interactions,
                accepted = summary.accepted_entries,
                rejected = summary.rejected_entries,
                "Reweighting complete: {}",
                args.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<RunSummary> {
    ensure!(
        args.output != args.input,
        "output path {} would overwrite the input store",
        args.output.display()
    );

    info!("@@ Reading configuration {} [{}]", args.config.display(), args.key);
    let config = ProviderConfiguration::load(&args.config, &args.key)
        .with_context(|| format!("Failed to load provider configuration from {}", args.config.display()))?;

    let options = RunOptions {
        skip: args.skip,
        max_events: args.max_events.unwrap_or(usize::MAX),
    };
    let mut pipeline = Pipeline::from_config(&config, options).context("Failed to build parameter registry")?;

    let layout = StoreLayout::default();
    let store = StoreConfig::default();

    info!("@@ Input file: {}", args.input.display());
    let primary: TreeReader<PrimaryRecord> = TreeReader::open(&args.input, &layout.primary_tree, store)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let secondary_path = args.secondary.as_ref().unwrap_or(&args.input);
    let secondary: TreeReader<SecondaryRecord> = TreeReader::open(secondary_path, &layout.secondary_tree, store)
        .with_context(|| format!("Failed to open generator records in {}", secondary_path.display()))?;

    let output = args.output.clone();
    pipeline
        .run(primary, secondary, move || FileSink::create(output, layout, store))
        .with_context(|| format!("Failed to reweight {}", args.input.display()))
}
