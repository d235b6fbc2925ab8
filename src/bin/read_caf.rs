//! Inspect a CAF record store.
//!
//! **Usage:**
//! ```bash
//! read-caf -i <store.caf> [-N <n>] [-s <n>]
//! ```
//!
//! Prints the global parameter table when the store has one, then each event
//! with its interactions and attached weights.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use tracing::error;

use caf_reweight::{
    GlobalRecord, PrimaryRecord, RecordSource, RunOptions, StoreConfig, StoreLayout, StoreReader, TreeReader,
};

/// Print the contents of a CAF record store
#[derive(Parser, Debug)]
#[command(name = "read-caf", disable_help_flag = true)]
struct Args {
    /// Record store to read
    #[arg(short = 'i', value_name = "INPUT")]
    input: PathBuf,

    /// Maximum number of events to print
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
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match dump(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dump(args: &Args) -> Result<()> {
    let layout = StoreLayout::default();
    let config = StoreConfig::default();

    let mut store =
        StoreReader::open(&args.input, config).with_context(|| format!("Failed to open {}", args.input.display()))?;
    if store.has_tree(&layout.global_tree) {
        let global: GlobalRecord = store
            .read(&layout.global_tree, 0)
            .context("Failed to read the global parameter table")?;
        println!("Parameters ({}), fingerprint {}:", global.params.len(), global.fingerprint);
        for p in &global.params {
            let kind = if p.is_correction { "correction" } else { "variation" };
            println!("  {:>4}  {:<32} {:>3} {}", p.id, p.name, p.variation_count, kind);
        }
    }

    let mut events: TreeReader<PrimaryRecord> = TreeReader::open(&args.input, &layout.primary_tree, config)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let total = events.len();
    println!("Events: {total}");

    let options = RunOptions {
        skip: args.skip,
        max_events: args.max_events.unwrap_or(usize::MAX),
    };
    for index in options.range(total) {
        let record = events.read(index).with_context(|| format!("Failed to read event {index}"))?;
        println!(
            "[{index}] run {} subrun {} event {}: {} interactions",
            record.run,
            record.subrun,
            record.event,
            record.interaction_count()
        );
        for (i, nu) in record.mc.nu.iter().enumerate() {
            println!(
                "    nu[{i}] pdg {} E = {:.4} GeV {} {} cv_weight {:.6}",
                nu.pdg,
                nu.energy,
                nu.mode,
                if nu.is_cc { "CC" } else { "NC" },
                nu.cv_weight
            );
            for w in &nu.syst_weights {
                println!("        param {:>4}: cv {:.6} weights {:?}", w.id, w.cv, w.weights);
            }
        }
    }
    Ok(())
}
