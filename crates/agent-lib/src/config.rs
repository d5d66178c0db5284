//! Simulation configuration

use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};

/// Settings for one simulated episode and the agent that runs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Episode length in ticks
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Seed for the environment and the agent
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Detector window; training waits for 2x this many samples per service
    #[serde(default = "default_detector_window")]
    pub detector_window: usize,

    /// Expected outlier fraction in the detector's baseline
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    /// Trees per service model
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Use the UCB1 bandit rather than the fixed playbook rule
    #[serde(default = "default_use_bandit")]
    pub use_bandit: bool,

    /// Ticks a restarted service is blocked from another restart
    #[serde(default = "default_restart_cooldown")]
    pub restart_cooldown: u32,

    /// Telemetry entries retained by the diagnoser
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_steps() -> u32 {
    240
}

fn default_seed() -> u64 {
    7
}

fn default_detector_window() -> usize {
    30
}

fn default_contamination() -> f64 {
    0.06
}

fn default_n_estimators() -> usize {
    200
}

fn default_use_bandit() -> bool {
    true
}

fn default_restart_cooldown() -> u32 {
    20
}

fn default_history_cap() -> usize {
    200
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            seed: default_seed(),
            detector_window: default_detector_window(),
            contamination: default_contamination(),
            n_estimators: default_n_estimators(),
            use_bandit: default_use_bandit(),
            restart_cooldown: default_restart_cooldown(),
            history_cap: default_history_cap(),
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    /// Reject settings that cannot drive an episode
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(SimError::InvalidConfig("steps must be at least 1".into()));
        }
        if self.detector_window == 0 {
            return Err(SimError::InvalidConfig(
                "detector_window must be at least 1".into(),
            ));
        }
        if self.n_estimators == 0 {
            return Err(SimError::InvalidConfig(
                "n_estimators must be at least 1".into(),
            ));
        }
        if !(0.0..0.5).contains(&self.contamination) {
            return Err(SimError::InvalidConfig(format!(
                "contamination must be in [0, 0.5), got {}",
                self.contamination
            )));
        }
        if self.history_cap == 0 {
            return Err(SimError::InvalidConfig(
                "history_cap must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
