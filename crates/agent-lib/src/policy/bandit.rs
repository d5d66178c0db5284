//! UCB1 bandit keyed by incident signature

use super::IncidentSignature;
use crate::sim::{Action, ActionKey};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ArmStats {
    pulls: u32,
    value: f64,
}

/// Per-signature action statistics with UCB1 selection
#[derive(Debug, Clone, Default)]
pub struct Ucb1Bandit {
    arms: BTreeMap<IncidentSignature, BTreeMap<ActionKey, ArmStats>>,
}

impl Ucb1Bandit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick one of `candidates`.
    ///
    /// Untried keys are returned first, in list order. Once all have been
    /// tried the highest `value + sqrt(2 ln(total + 1) / n)` wins, earliest
    /// candidate on ties. Returns `None` only for an empty candidate list.
    pub fn select<'a>(
        &mut self,
        signature: &IncidentSignature,
        candidates: &'a [Action],
    ) -> Option<&'a Action> {
        let arms = self.arms.entry(signature.clone()).or_default();

        if let Some(untried) = candidates
            .iter()
            .find(|a| arms.get(&a.key()).map_or(true, |s| s.pulls == 0))
        {
            return Some(untried);
        }

        let total: u32 = arms.values().map(|s| s.pulls).sum();
        let log_total = (f64::from(total) + 1.0).ln();

        let mut best: Option<(&Action, f64)> = None;
        for action in candidates {
            let stats = arms.get(&action.key()).copied().unwrap_or_default();
            let ucb = stats.value + (2.0 * log_total / f64::from(stats.pulls)).sqrt();
            if best.map_or(true, |(_, top)| ucb > top) {
                best = Some((action, ucb));
            }
        }
        best.map(|(action, _)| action)
    }

    /// Fold one observed reward into the action's running mean
    pub fn update(&mut self, signature: &IncidentSignature, action: &Action, reward: f64) {
        let stats = self
            .arms
            .entry(signature.clone())
            .or_default()
            .entry(action.key())
            .or_default();
        stats.pulls += 1;
        stats.value += (reward - stats.value) / f64::from(stats.pulls);
    }

    pub fn pulls(&self, signature: &IncidentSignature, key: ActionKey) -> u32 {
        self.arms
            .get(signature)
            .and_then(|arms| arms.get(&key))
            .map_or(0, |s| s.pulls)
    }

    pub fn value(&self, signature: &IncidentSignature, key: ActionKey) -> f64 {
        self.arms
            .get(signature)
            .and_then(|arms| arms.get(&key))
            .map_or(0.0, |s| s.value)
    }
}
