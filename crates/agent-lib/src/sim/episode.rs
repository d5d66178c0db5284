//! Episode controller
//!
//! Owns the simulated system and its RNG, injects one fault per episode,
//! dispatches actions, and turns each tick into a reward plus incident
//! timing (first SLO violation, first recovery).

use super::action::{Action, ActionRecord};
use super::fault::{sample_fault, FaultEvent};
use super::system::SimulatedSystem;
use crate::config::SimConfig;
use crate::error::Result;
use crate::models::Telemetry;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

/// Reward for a tick that is within SLO
pub const HEALTHY_REWARD: f64 = 1.0;

/// Penalty for a tick in SLO violation
pub const VIOLATION_PENALTY: f64 = 2.0;

/// Penalty for every tick between the first violation and recovery
pub const UNRECOVERED_PENALTY: f64 = 0.02;

/// Diagnostic information attached to each step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    /// The episode's fault, including any remediation-shortened duration
    pub fault: Option<FaultEvent>,
    pub tick: u32,
    pub first_violation_tick: Option<u32>,
    pub recovery_tick: Option<u32>,
}

impl StepInfo {
    /// Recovery tick minus first-violation tick, when both exist
    pub fn mttr_proxy(&self) -> Option<u32> {
        match (self.first_violation_tick, self.recovery_tick) {
            (Some(first), Some(recovered)) => Some(recovered.saturating_sub(first)),
            _ => None,
        }
    }
}

/// Outcome of advancing the episode by one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub telemetry: Telemetry,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Drives episodes over a [`SimulatedSystem`]
pub struct EpisodeController {
    rng: StdRng,
    steps: u32,
    system: SimulatedSystem,
    tick: u32,
    incident_active: bool,
    first_violation_tick: Option<u32>,
    recovery_tick: Option<u32>,
}

impl EpisodeController {
    pub fn new(seed: u64, steps: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            steps,
            system: SimulatedSystem::new(),
            tick: 0,
            incident_active: false,
            first_violation_tick: None,
            recovery_tick: None,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.seed, config.steps)
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn fault(&self) -> Option<&FaultEvent> {
        self.system.active_fault()
    }

    pub fn system(&self) -> &SimulatedSystem {
        &self.system
    }

    /// Start a new episode, optionally reseeding first.
    ///
    /// Samples exactly one fault and returns the initial telemetry.
    pub fn reset(&mut self, seed: Option<u64>) -> Telemetry {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
            self.system = SimulatedSystem::new();
        }

        let fault = sample_fault(&mut self.rng, self.steps);
        self.start(fault)
    }

    /// Start a new episode with a caller-chosen fault instead of a sampled one
    pub fn reset_with_fault(&mut self, fault: FaultEvent) -> Telemetry {
        self.start(fault)
    }

    fn start(&mut self, fault: FaultEvent) -> Telemetry {
        debug!(
            fault_kind = %fault.kind(),
            service = %fault.service(),
            start_tick = fault.start_tick(),
            duration = fault.duration(),
            "Episode reset"
        );
        self.system.reset(fault);

        self.tick = 0;
        self.incident_active = false;
        self.first_violation_tick = None;
        self.recovery_tick = None;

        self.system.observe(&mut self.rng)
    }

    /// Execute an action against the system
    pub fn act(&mut self, action: &Action) {
        debug!(tick = self.tick, action = %action, "Executing action");
        match action {
            Action::Restart { service } => self.system.restart(*service),
            Action::Scale { service, delta } => self.system.scale(*service, *delta),
            Action::ClearCache => self.system.clear_cache(),
            Action::LimitTraffic { factor } => self.system.limit_traffic(*factor),
            Action::Noop => {}
        }
    }

    /// Execute an untyped action record.
    ///
    /// Unknown types are rejected before any state is touched.
    pub fn act_record(&mut self, record: &ActionRecord) -> Result<()> {
        let action = Action::try_from(record)?;
        self.act(&action);
        Ok(())
    }

    /// Advance one tick and score it
    pub fn step(&mut self) -> StepResult {
        self.tick += 1;
        let telemetry = self.system.step(&mut self.rng);

        if telemetry.slo_violation && self.first_violation_tick.is_none() {
            self.first_violation_tick = Some(self.tick);
            self.incident_active = true;
            debug!(tick = self.tick, "First SLO violation");
        }

        if self.incident_active && !telemetry.slo_violation {
            if self.recovery_tick.is_none() {
                self.recovery_tick = Some(self.tick);
                debug!(tick = self.tick, "Recovered from SLO violation");
            }
            self.incident_active = false;
        }

        let mut reward = HEALTHY_REWARD;
        if telemetry.slo_violation {
            reward -= VIOLATION_PENALTY;
        }
        if self.first_violation_tick.is_some() && self.recovery_tick.is_none() {
            reward -= UNRECOVERED_PENALTY;
        }

        StepResult {
            telemetry,
            reward,
            done: self.tick >= self.steps,
            info: StepInfo {
                fault: self.system.active_fault().cloned(),
                tick: self.tick,
                first_violation_tick: self.first_violation_tick,
                recovery_tick: self.recovery_tick,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::models::ServiceId;

    #[test]
    fn test_reset_samples_one_fault() {
        let mut env = EpisodeController::new(7, 240);
        assert!(env.fault().is_none());
        let tel = env.reset(Some(7));
        let fault = env.fault().unwrap().clone();
        assert!(fault.start_tick() >= 10);
        assert_eq!(tel.latency_ms_p95.len(), 3);
        assert_eq!(env.tick(), 0);

        // Same seed, same fault
        env.reset(Some(7));
        assert_eq!(env.fault().unwrap(), &fault);
    }

    #[test]
    fn test_reward_and_done() {
        let mut env = EpisodeController::new(1, 5);
        env.reset(None);
        let mut last = None;
        for _ in 0..5 {
            let res = env.step();
            let expected = if res.telemetry.slo_violation {
                HEALTHY_REWARD - VIOLATION_PENALTY
            } else {
                HEALTHY_REWARD
            };
            if res.info.first_violation_tick.is_none() {
                assert_eq!(res.reward, expected);
            }
            last = Some(res);
        }
        let last = last.unwrap();
        assert!(last.done);
        assert_eq!(last.info.tick, 5);
    }

    #[test]
    fn test_act_record_rejects_unknown_type() {
        let mut env = EpisodeController::new(3, 60);
        env.reset(None);
        let before = env.system().traffic_limit();
        let err = env
            .act_record(&ActionRecord::new("drop_database"))
            .unwrap_err();
        assert_eq!(err, SimError::InvalidAction("drop_database".to_string()));
        assert_eq!(env.system().traffic_limit(), before);
    }

    #[test]
    fn test_act_dispatches_to_system() {
        let mut env = EpisodeController::new(3, 60);
        env.reset(None);
        env.act(&Action::scale_up(ServiceId::Db));
        env.act(&Action::limit_traffic());
        assert_eq!(env.system().service_state(ServiceId::Db).unwrap().replicas, 2);
        assert_eq!(env.system().traffic_limit(), 0.7);

        env.act_record(&ActionRecord::new("noop")).unwrap();
        assert_eq!(env.system().traffic_limit(), 0.7);
    }

    #[test]
    fn test_reset_with_fault_uses_given_fault() {
        use crate::sim::fault::FaultKind;

        let mut env = EpisodeController::new(3, 60);
        let fault = FaultEvent::new(12, 9, ServiceId::Cache, FaultKind::CachePoison, 0.6);
        env.reset_with_fault(fault.clone());
        assert_eq!(env.fault(), Some(&fault));
        assert_eq!(env.tick(), 0);
    }

    #[test]
    fn test_mttr_proxy() {
        let info = StepInfo {
            fault: None,
            tick: 100,
            first_violation_tick: Some(40),
            recovery_tick: Some(52),
        };
        assert_eq!(info.mttr_proxy(), Some(12));
        let open = StepInfo {
            recovery_tick: None,
            ..info
        };
        assert_eq!(open.mttr_proxy(), None);
    }
}
