//! AIOps loop simulator CLI
//!
//! Runs single closed-loop episodes with an incident report, and batch
//! evaluations that export per-episode results.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{eval, run};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// AIOps loop simulator CLI
#[derive(Parser)]
#[command(name = "aiops")]
#[command(author, version, about = "Closed-loop AIOps incident-response simulator", long_about = None)]
pub struct Cli {
    /// Settings file (TOML, JSON or YAML); AIOPS_* env vars override it
    #[arg(long, env = "AIOPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one episode and print an incident report
    Run {
        #[command(flatten)]
        sim: config::SimArgs,

        /// Print a timeline every 5 ticks and on every incident tick
        #[arg(long)]
        render: bool,

        /// Print loop metrics in Prometheus text format afterwards
        #[arg(long)]
        metrics: bool,
    },

    /// Run many episodes and save per-episode results as JSON
    Eval {
        #[command(flatten)]
        sim: config::SimArgs,

        /// Number of episodes
        #[arg(long, default_value_t = 50)]
        episodes: usize,

        /// Seed of the first episode; later episodes use seed0 + i
        #[arg(long, default_value_t = 1)]
        seed0: u64,

        /// Output file path
        #[arg(long, short, default_value = "results.json")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run {
            sim,
            render,
            metrics,
        } => {
            let settings = config::load(cli.config.as_deref(), &sim)?;
            run::run_episode(&settings, render, metrics, cli.format)?;
        }
        Commands::Eval {
            sim,
            episodes,
            seed0,
            out,
        } => {
            let settings = config::load(cli.config.as_deref(), &sim)?;
            eval::run_eval(&settings, episodes, seed0, &out, cli.format)?;
        }
    }

    Ok(())
}
