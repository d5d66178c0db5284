//! Action selection
//!
//! Builds a playbook candidate set from the root-cause hypothesis, drops
//! restarts that are still cooling down, and picks one action either with
//! the UCB1 bandit or with a fixed rule.

mod bandit;

pub use bandit::Ucb1Bandit;

use crate::config::SimConfig;
use crate::diagnoser::RcaHypothesis;
use crate::models::{ServiceId, Telemetry};
use crate::sim::{Action, ActionKey};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Default ticks a restarted service waits before another restart
pub const DEFAULT_RESTART_COOLDOWN: u32 = 20;

/// CPU above which the fixed rule scales instead of restarting
pub const SCALE_CPU_THRESHOLD: f64 = 0.85;

/// Coarse situation key the bandit learns under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IncidentSignature {
    pub service: ServiceId,
    pub latency_breached: bool,
    pub error_breached: bool,
}

impl IncidentSignature {
    pub fn new(service: ServiceId, latency_breached: bool, error_breached: bool) -> Self {
        Self {
            service,
            latency_breached,
            error_breached,
        }
    }

    pub fn from_observation(telemetry: &Telemetry, hypothesis: &RcaHypothesis) -> Self {
        Self::new(
            hypothesis.primary_service,
            telemetry.api_latency_breached(),
            telemetry.api_errors_breached(),
        )
    }
}

impl fmt::Display for IncidentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|lat>{}|err>{}",
            self.service,
            u8::from(self.latency_breached),
            u8::from(self.error_breached)
        )
    }
}

impl Serialize for IncidentSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The chosen action and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub rationale: String,
}

impl Decision {
    pub fn new(action: Action, rationale: impl Into<String>) -> Self {
        Self {
            action,
            rationale: rationale.into(),
        }
    }

    /// Decision used on ticks without an incident signal
    pub fn idle() -> Self {
        Self::new(Action::Noop, "No incident signal; doing nothing.")
    }
}

pub struct Policy {
    bandit: Option<Ucb1Bandit>,
    restart_cooldown: u32,
    /// Next tick at which each key may be used again
    cooldowns: BTreeMap<ActionKey, u32>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(true, DEFAULT_RESTART_COOLDOWN)
    }
}

impl Policy {
    pub fn new(use_bandit: bool, restart_cooldown: u32) -> Self {
        Self {
            bandit: use_bandit.then(Ucb1Bandit::new),
            restart_cooldown,
            cooldowns: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.use_bandit, config.restart_cooldown)
    }

    pub fn uses_bandit(&self) -> bool {
        self.bandit.is_some()
    }

    pub fn bandit(&self) -> Option<&Ucb1Bandit> {
        self.bandit.as_ref()
    }

    /// Whether `key` is off cooldown at `tick`; keys never used are allowed
    pub fn cooldown_allows(&self, key: ActionKey, tick: u32) -> bool {
        self.cooldowns.get(&key).map_or(true, |&next| tick >= next)
    }

    /// Playbook candidates for a suspected service, minus cooling restarts
    pub fn candidates(&self, service: ServiceId, tick: u32) -> Vec<Action> {
        let mut candidates = vec![Action::Noop];
        match service {
            ServiceId::Api | ServiceId::Db => {
                candidates.push(Action::restart(service));
                candidates.push(Action::scale_up(service));
            }
            ServiceId::Cache => {
                candidates.push(Action::ClearCache);
                candidates.push(Action::restart(ServiceId::Cache));
            }
        }
        candidates.push(Action::limit_traffic());

        candidates.retain(|a| !a.is_restart() || self.cooldown_allows(a.key(), tick));
        candidates
    }

    pub fn decide(&mut self, telemetry: &Telemetry, hypothesis: &RcaHypothesis, tick: u32) -> Decision {
        let service = hypothesis.primary_service;
        let signature = IncidentSignature::from_observation(telemetry, hypothesis);
        let candidates = self.candidates(service, tick);

        let picked = self.bandit.as_mut().map(|bandit| {
            bandit
                .select(&signature, &candidates)
                .cloned()
                .unwrap_or(Action::Noop)
        });

        let decision = match picked {
            Some(action) => {
                Decision::new(
                    action,
                    format!(
                        "Bandit pick for signature={}; RCA guess was {} (conf={:.2}).",
                        signature, service, hypothesis.confidence
                    ),
                )
            }
            None => self.playbook_rule(telemetry, service),
        };

        if decision.action.is_restart() {
            self.cooldowns
                .insert(decision.action.key(), tick + self.restart_cooldown);
        }

        debug!(
            tick = tick,
            signature = %signature,
            candidates = candidates.len(),
            action = %decision.action,
            "Policy decision"
        );
        decision
    }

    /// Deterministic choice used when learning is disabled
    fn playbook_rule(&self, telemetry: &Telemetry, service: ServiceId) -> Decision {
        if service == ServiceId::Cache {
            return Decision::new(Action::ClearCache, "Cache suspected; clearing cache first.");
        }
        if telemetry.cpu(service) > SCALE_CPU_THRESHOLD {
            return Decision::new(
                Action::scale_up(service),
                format!("{} CPU is high; scaling it up.", service),
            );
        }
        Decision::new(
            Action::restart(service),
            format!("Restarting {} as a general mitigation.", service),
        )
    }

    /// Credit `reward` to `action` under the pre-action signature
    pub fn learn(
        &mut self,
        before: &Telemetry,
        _after: &Telemetry,
        hypothesis: &RcaHypothesis,
        action: &Action,
        reward: f64,
    ) {
        if let Some(bandit) = self.bandit.as_mut() {
            let signature = IncidentSignature::from_observation(before, hypothesis);
            bandit.update(&signature, action, reward);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceMap;

    fn telemetry(api_latency: f64, api_error: f64, db_cpu: f64) -> Telemetry {
        let mut lat = ServiceMap::new();
        let mut err = ServiceMap::new();
        let mut cpu = ServiceMap::new();
        let mut mem = ServiceMap::new();
        for s in ServiceId::ALL {
            lat.insert(s, 30.0);
            err.insert(s, 0.005);
            cpu.insert(s, 0.3);
            mem.insert(s, 0.3);
        }
        lat.insert(ServiceId::Api, api_latency);
        err.insert(ServiceId::Api, api_error);
        cpu.insert(ServiceId::Db, db_cpu);
        Telemetry::new(lat, err, cpu, mem, 150.0)
    }

    fn hypothesis(service: ServiceId) -> RcaHypothesis {
        RcaHypothesis::new(service, 0.7, "test")
    }

    #[test]
    fn test_signature_format() {
        let tel = telemetry(300.0, 0.01, 0.3);
        let sig = IncidentSignature::from_observation(&tel, &hypothesis(ServiceId::Db));
        assert_eq!(sig.to_string(), "db|lat>1|err>0");
        assert_eq!(serde_json::to_string(&sig).unwrap(), "\"db|lat>1|err>0\"");
    }

    #[test]
    fn test_candidates_per_service() {
        let policy = Policy::default();
        assert_eq!(
            policy.candidates(ServiceId::Db, 0),
            vec![
                Action::Noop,
                Action::restart(ServiceId::Db),
                Action::scale_up(ServiceId::Db),
                Action::limit_traffic(),
            ]
        );
        assert_eq!(
            policy.candidates(ServiceId::Cache, 0),
            vec![
                Action::Noop,
                Action::ClearCache,
                Action::restart(ServiceId::Cache),
                Action::limit_traffic(),
            ]
        );
    }

    #[test]
    fn test_restart_cooldown_window() {
        let mut policy = Policy::default();
        let tel = telemetry(300.0, 0.01, 0.3);
        let h = hypothesis(ServiceId::Db);

        // noop is explored first, then restart
        policy.decide(&tel, &h, 40);
        policy.learn(&tel, &tel, &h, &Action::Noop, -1.0);
        let decision = policy.decide(&tel, &h, 40);
        assert_eq!(decision.action, Action::restart(ServiceId::Db));

        for tick in 40..60 {
            assert!(!policy
                .candidates(ServiceId::Db, tick)
                .contains(&Action::restart(ServiceId::Db)));
        }
        assert!(policy
            .candidates(ServiceId::Db, 60)
            .contains(&Action::restart(ServiceId::Db)));
        // other services are unaffected
        assert!(policy
            .candidates(ServiceId::Api, 45)
            .contains(&Action::restart(ServiceId::Api)));
    }

    #[test]
    fn test_fixed_rule() {
        let mut policy = Policy::new(false, 20);
        assert!(!policy.uses_bandit());

        let calm = telemetry(300.0, 0.01, 0.3);
        let hot = telemetry(300.0, 0.01, 0.95);
        assert_eq!(
            policy.decide(&calm, &hypothesis(ServiceId::Cache), 10).action,
            Action::ClearCache
        );
        assert_eq!(
            policy.decide(&hot, &hypothesis(ServiceId::Db), 10).action,
            Action::scale_up(ServiceId::Db)
        );
        assert_eq!(
            policy.decide(&calm, &hypothesis(ServiceId::Db), 10).action,
            Action::restart(ServiceId::Db)
        );
    }

    #[test]
    fn test_fixed_rule_restarts_through_cooldown() {
        let mut policy = Policy::new(false, 20);
        let calm = telemetry(300.0, 0.01, 0.3);
        let h = hypothesis(ServiceId::Db);

        assert_eq!(policy.decide(&calm, &h, 10).action, Action::restart(ServiceId::Db));
        // cooldown only filters bandit candidates; the fixed rule re-arms it
        assert_eq!(policy.decide(&calm, &h, 15).action, Action::restart(ServiceId::Db));
        assert!(!policy.cooldown_allows(ActionKey::Restart(ServiceId::Db), 34));
        assert!(policy.cooldown_allows(ActionKey::Restart(ServiceId::Db), 35));
    }

    #[test]
    fn test_learn_uses_pre_action_signature() {
        let mut policy = Policy::default();
        let before = telemetry(300.0, 0.01, 0.3);
        let after = telemetry(40.0, 0.01, 0.3);
        let h = hypothesis(ServiceId::Api);
        policy.learn(&before, &after, &h, &Action::scale_up(ServiceId::Api), 1.0);

        let bandit = policy.bandit().unwrap();
        let sig_before = IncidentSignature::new(ServiceId::Api, true, false);
        let sig_after = IncidentSignature::new(ServiceId::Api, false, false);
        assert_eq!(bandit.pulls(&sig_before, ActionKey::Scale(ServiceId::Api)), 1);
        assert_eq!(bandit.pulls(&sig_after, ActionKey::Scale(ServiceId::Api)), 0);
    }

    #[test]
    fn test_learn_without_bandit_is_noop() {
        let mut policy = Policy::new(false, 20);
        let tel = telemetry(40.0, 0.01, 0.3);
        policy.learn(&tel, &tel, &hypothesis(ServiceId::Api), &Action::Noop, 1.0);
        assert!(policy.bandit().is_none());
    }
}
