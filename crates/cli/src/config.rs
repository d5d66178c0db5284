//! Configuration management for the CLI
//!
//! Settings are layered lowest to highest: built-in defaults, a settings
//! file, `AIOPS_*` environment variables, then command-line flags.

use aiops_lib::SimConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Simulation flags shared by `run` and `eval`
#[derive(Debug, Clone, Default, Args)]
pub struct SimArgs {
    /// Episode length in ticks
    #[arg(long)]
    pub steps: Option<u32>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Detector window (training waits for twice this many ticks)
    #[arg(long)]
    pub window: Option<usize>,

    /// Restart cooldown in ticks
    #[arg(long)]
    pub cooldown: Option<u32>,

    /// Use the fixed playbook rule instead of the bandit
    #[arg(long)]
    pub no_bandit: bool,
}

/// Default settings file, used when it exists and no --config is given
fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("aiops").join("config.toml"))
}

/// Build the effective simulation settings
pub fn load(path: Option<&Path>, args: &SimArgs) -> Result<SimConfig> {
    let file = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };
    load_from(file.as_deref(), args)
}

fn load_from(file: Option<&Path>, args: &SimArgs) -> Result<SimConfig> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
        builder = builder.add_source(config::File::from(file.to_path_buf()));
    }

    let builder = builder
        .add_source(config::Environment::with_prefix("AIOPS"))
        .set_override_option("steps", args.steps.map(|v| v.to_string()))?
        .set_override_option("seed", args.seed.map(|v| v.to_string()))?
        .set_override_option("detector_window", args.window.map(|v| v.to_string()))?
        .set_override_option("restart_cooldown", args.cooldown.map(|v| v.to_string()))?
        .set_override_option("use_bandit", args.no_bandit.then_some(false))?;

    let settings: SimConfig = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}
