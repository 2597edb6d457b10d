mod cli;
mod error;
mod runner;
mod stats;

use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::Args,
    error::{AppError, Result},
    runner::LoadTest,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;

    let non_zero_secs = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
    let load_test = LoadTest {
        session_config: args.session_config()?,
        users: args.users,
        spawn_interval: args.spawn_interval()?,
        run_time: non_zero_secs(args.run_time),
        stats_interval: non_zero_secs(args.stats_interval),
    };
    load_test.run().await
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
