//! chords-sim - concurrent workload simulator for the chords allocation engine
//!
//! Builds a registry from the configured pools, runs worker threads that
//! repeatedly acquire random resource sets, and reports wait statistics.

mod cli;
mod error;
mod events;
mod sim;

use crate::cli::{Cli, Commands, RunArgs};
use crate::error::CliError;
use crate::events::EventTally;
use crate::sim::{Summary, Workload};
use chords_allocator::Allocator;
use chords_config::Config;
use chords_errors::Error;
use chords_events::EventReceiver;
use chords_resources::Registry;
use clap::Parser;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting chords-sim v{}", env!("CARGO_PKG_VERSION"));

    // Precedence: file (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_ref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.command)?;

    match cli.command {
        Commands::ShowConfig => {
            print!("{}", config.to_toml_string()?);
        }
        Commands::Run(args) => {
            let summary = run_simulation(config, &args).await?;
            render_summary(&summary, cli.global.json);
        }
    }
    Ok(())
}

/// Apply command line overrides on top of file and environment settings
fn apply_cli_config(config: &mut Config, command: &Commands) -> Result<(), CliError> {
    let Commands::Run(args) = command else {
        return Ok(());
    };
    if args.workers == 0 {
        return Err(CliError::InvalidArguments(
            "--workers must be at least 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&args.exclusive_ratio) {
        return Err(CliError::InvalidArguments(format!(
            "--exclusive-ratio must be between 0 and 1, got {}",
            args.exclusive_ratio
        )));
    }
    if let Some(fairness) = args.fairness {
        config.fairness.policy = fairness.into();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.wait.timeout_ms = Some(timeout_ms);
    }
    config.validate()?;
    Ok(())
}

/// Build registry and allocator, run the workload, and tally events meanwhile
async fn run_simulation(config: Config, args: &RunArgs) -> Result<Summary, CliError> {
    let (event_sender, event_receiver) = chords_events::channel();

    let pools = if config.pools.is_empty() {
        sim::default_pools()
    } else {
        config.pools.clone()
    };
    let registry =
        Arc::new(Registry::from_pool_configs(&pools)?.with_events(event_sender.clone()));
    let allocator = Allocator::from_config(&config, registry).with_events(event_sender);
    info!(
        pools = pools.len(),
        policy = allocator.fairness().name(),
        workers = args.workers,
        rounds = args.rounds,
        "starting workload"
    );

    let workload = Workload {
        workers: args.workers,
        rounds: args.rounds,
        hold: Duration::from_millis(args.hold_ms),
        exclusive_ratio: args.exclusive_ratio,
        seed: args.seed,
    };
    let worker = tokio::task::spawn_blocking(move || {
        sim::run_workload(&allocator, &pools, &workload)
    });
    let (mut summary, tally) = tally_while_running(worker, event_receiver).await?;
    summary.events = tally;
    Ok(summary)
}

/// Drain events concurrently with the workload
async fn tally_while_running(
    worker: tokio::task::JoinHandle<Result<Summary, Error>>,
    mut event_receiver: EventReceiver,
) -> Result<(Summary, EventTally), CliError> {
    let mut tally = EventTally::default();
    let mut worker = Box::pin(worker);
    loop {
        select! {
            result = &mut worker => {
                while let Ok(event) = event_receiver.try_recv() {
                    tally.handle_event(&event);
                }
                return Ok((result??, tally));
            }
            Some(event) = event_receiver.recv() => {
                tally.handle_event(&event);
            }
        }
    }
}

fn render_summary(summary: &Summary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => error!("failed to render summary: {e}"),
        }
        return;
    }
    println!(
        "workers: {}  rounds: {}  elapsed: {:.1}ms",
        summary.workers, summary.rounds, summary.elapsed_ms
    );
    println!(
        "acquisitions: {}  timeouts: {}  failures: {}",
        summary.acquisitions, summary.timeouts, summary.failures
    );
    println!(
        "wait: mean {:.2}ms  max {:.2}ms",
        summary.mean_wait_ms, summary.max_wait_ms
    );
    let events = &summary.events;
    println!(
        "events: queued {}  passes {} (skipped {})  failed {}",
        events.queued, events.passes, events.passes_skipped, events.failed
    );
}

/// Initialize tracing. JSON output keeps stdout clean, so logs only go to
/// stderr when debugging was asked for.
fn init_tracing(json_mode: bool, debug_enabled_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if json_mode && !debug_enabled {
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chords=debug")),
            )
            .init();
    } else if debug_enabled {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chords=debug")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
}
