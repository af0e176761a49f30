//! Command line interface definition

use chords_config::FairnessKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// chords-sim - drive the chords allocation engine with a concurrent workload
#[derive(Parser)]
#[command(name = "chords-sim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent workload simulator for the chords allocation engine")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH", env = "CHORDS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a workload of concurrent scoped acquisitions
    Run(RunArgs),

    /// Print the effective configuration as TOML
    #[command(name = "show-config")]
    ShowConfig,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of worker threads
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Scoped acquisitions per worker
    #[arg(long, default_value_t = 50)]
    pub rounds: usize,

    /// How long each acquisition holds its resources
    #[arg(long, value_name = "MS", default_value_t = 2)]
    pub hold_ms: u64,

    /// Probability that a request is exclusive
    #[arg(long, value_name = "P", default_value_t = 0.3)]
    pub exclusive_ratio: f64,

    /// Seed for reproducible request choices
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the configured fairness policy
    #[arg(long, value_enum)]
    pub fairness: Option<FairnessArg>,

    /// Override the configured wait timeout
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FairnessArg {
    BestEffort,
    StrictFifo,
}

impl From<FairnessArg> for FairnessKind {
    fn from(arg: FairnessArg) -> Self {
        match arg {
            FairnessArg::BestEffort => FairnessKind::BestEffort,
            FairnessArg::StrictFifo => FairnessKind::StrictFifo,
        }
    }
}
