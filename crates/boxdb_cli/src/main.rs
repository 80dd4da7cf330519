//! BoxDB time-series demo
//!
//! Stores a synthetic series of sensor samples in batch, adds two named
//! time ranges and reads one of them back.
//!
//! # Commands
//!
//! - (none) - run the demo workload
//! - `minmax` - run the workload, then print time-series limits

mod demo;
mod model;
mod stopwatch;

use boxdb_core::{Options, Store, TimeSeriesMinMax};
use clap::{Parser, Subcommand};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Time-series demo for BoxDB.
#[derive(Parser)]
#[command(name = "boxdb-ts-demo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of sensor samples to generate
    #[arg(global = true, short, long, default_value_t = 1_000_000)]
    count: usize,

    /// Maximum database size in KiB (0 = unbounded)
    #[arg(global = true, long, default_value_t = 4 * 1024 * 1024)]
    max_db_size_in_kb: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workload, then print time-series limits
    Minmax,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("BoxDB TS demo v{}", env!("CARGO_PKG_VERSION"));
    let store = Store::open(
        Options::new()
            .model(model::model())
            .max_db_size_in_kb(cli.max_db_size_in_kb),
    )?;
    println!("BoxDB store opened");

    let now = millis_since_epoch()?;
    let summary = demo::run(&store, cli.count, now)?;
    tracing::debug!(
        samples = summary.samples,
        ranges = summary.range_count,
        red = summary.red_id,
        read_back = summary.red.is_some(),
        "demo workload stored"
    );

    if let Some(Commands::Minmax) = cli.command {
        let (all, within) = demo::limits(&store, &summary.green)?;
        print_limits("all samples", all.as_ref());
        print_limits("time range 'green'", within.as_ref());
    }

    store.close()?;
    Ok(())
}

fn millis_since_epoch() -> Result<i64, Box<dyn std::error::Error>> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(i64::try_from(elapsed.as_millis())?)
}

fn print_limits(label: &str, limits: Option<&TimeSeriesMinMax>) {
    match limits {
        Some(limits) => println!(
            "Limits of {label}: min {} (ID {}), max {} (ID {})",
            limits.min_value, limits.min_id, limits.max_value, limits.max_id
        ),
        None => println!("Limits of {label}: no samples"),
    }
}
