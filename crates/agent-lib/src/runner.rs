//! Episode runner and batch evaluation

use crate::agent::{Agent, AgentStep};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::models::ServiceId;
use crate::observability::LoopMetrics;
use crate::sim::{EpisodeController, FaultKind, StepResult};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// How often an action type was executed during an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCount {
    pub action: String,
    pub count: u32,
}

/// One row of results per episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub seed: u64,
    pub steps: u32,
    pub fault_kind: FaultKind,
    pub fault_service: ServiceId,
    pub fault_start_tick: u32,
    /// Duration at episode end, after any remediation shortening
    pub fault_duration: u32,
    pub fault_severity: f64,
    /// Ticks the detector flagged
    pub anomaly_steps: u32,
    /// Ticks that began in SLO violation
    pub slo_steps: u32,
    pub first_violation_tick: Option<u32>,
    pub recovery_tick: Option<u32>,
    pub mttr_proxy: Option<u32>,
    pub total_reward: f64,
    /// Sorted by descending count, then action name
    pub action_counts: Vec<ActionCount>,
}

/// Full trace of one episode plus its summary
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeRun {
    pub trace: Vec<(AgentStep, StepResult)>,
    pub summary: EpisodeSummary,
}

/// Run one episode to completion with an agent seeded like the environment
pub fn run_episode(config: &SimConfig) -> Result<EpisodeRun> {
    config.validate()?;

    let mut env = EpisodeController::from_config(config);
    let mut telemetry = env.reset(Some(config.seed));
    let mut agent = Agent::new(config);

    let fault = env
        .fault()
        .cloned()
        .ok_or_else(|| SimError::InvalidConfig("episode started without a fault".into()))?;
    agent.logger().log_fault_injected(&fault);

    let mut trace = Vec::with_capacity(config.steps as usize);
    let mut tick = 0;
    loop {
        tick += 1;
        let (step, result) = agent.step(&mut env, &telemetry, tick);
        telemetry = result.telemetry.clone();
        let done = result.done;
        trace.push((step, result));
        if done {
            break;
        }
    }

    let summary = summarize(config, &trace)?;
    agent.logger().log_episode_complete(
        summary.steps,
        summary.total_reward,
        summary.first_violation_tick,
        summary.mttr_proxy,
    );
    LoopMetrics::new().inc_episodes_completed();

    Ok(EpisodeRun { trace, summary })
}

fn summarize(config: &SimConfig, trace: &[(AgentStep, StepResult)]) -> Result<EpisodeSummary> {
    let (_, last) = trace
        .last()
        .ok_or_else(|| SimError::InvalidConfig("episode produced no steps".into()))?;
    let fault = last
        .info
        .fault
        .as_ref()
        .ok_or_else(|| SimError::InvalidConfig("episode finished without a fault".into()))?;

    let mut counts: BTreeMap<&'static str, u32> = BTreeMap::new();
    for (step, _) in trace {
        *counts.entry(step.decision.action.type_name()).or_default() += 1;
    }
    let mut action_counts: Vec<ActionCount> = counts
        .into_iter()
        .map(|(action, count)| ActionCount {
            action: action.to_string(),
            count,
        })
        .collect();
    action_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));

    Ok(EpisodeSummary {
        seed: config.seed,
        steps: last.info.tick,
        fault_kind: fault.kind(),
        fault_service: fault.service(),
        fault_start_tick: fault.start_tick(),
        fault_duration: fault.duration(),
        fault_severity: fault.severity(),
        anomaly_steps: trace.iter().filter(|(s, _)| s.detection.is_anomaly).count() as u32,
        slo_steps: trace.iter().filter(|(s, _)| s.slo_violation).count() as u32,
        first_violation_tick: last.info.first_violation_tick,
        recovery_tick: last.info.recovery_tick,
        mttr_proxy: last.info.mttr_proxy(),
        total_reward: trace.iter().map(|(_, r)| r.reward).sum(),
        action_counts,
    })
}

/// Run `episodes` episodes with seeds `seed0, seed0 + 1, ...`
pub fn evaluate(config: &SimConfig, seed0: u64, episodes: usize) -> Result<Vec<EpisodeSummary>> {
    evaluate_with_progress(config, seed0, episodes, |_, _| {})
}

/// Like [`evaluate`], calling `progress(done, summary)` after each episode
pub fn evaluate_with_progress<F>(
    config: &SimConfig,
    seed0: u64,
    episodes: usize,
    mut progress: F,
) -> Result<Vec<EpisodeSummary>>
where
    F: FnMut(usize, &EpisodeSummary),
{
    let mut summaries = Vec::with_capacity(episodes);
    for i in 0..episodes {
        let episode_config = config.clone().with_seed(seed0 + i as u64);
        let run = run_episode(&episode_config)?;
        progress(i + 1, &run.summary);
        summaries.push(run.summary);
    }
    info!(
        event = "evaluation_complete",
        episodes = episodes,
        seed0 = seed0,
        "Batch evaluation complete"
    );
    Ok(summaries)
}

/// Mean MTTR proxy for one (fault kind, service) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MttrGroup {
    pub fault_kind: FaultKind,
    pub fault_service: ServiceId,
    pub episodes: usize,
    /// Mean over recovered episodes; `None` if none recovered
    pub mean_mttr: Option<f64>,
}

/// Group summaries by fault and average the MTTR proxy.
///
/// Sorted by ascending mean; groups without any recovery come last.
pub fn mttr_by_fault(summaries: &[EpisodeSummary]) -> Vec<MttrGroup> {
    let mut groups: BTreeMap<(FaultKind, ServiceId), (usize, Vec<u32>)> = BTreeMap::new();
    for s in summaries {
        let entry = groups.entry((s.fault_kind, s.fault_service)).or_default();
        entry.0 += 1;
        if let Some(mttr) = s.mttr_proxy {
            entry.1.push(mttr);
        }
    }

    let mut rows: Vec<MttrGroup> = groups
        .into_iter()
        .map(|((fault_kind, fault_service), (episodes, mttrs))| MttrGroup {
            fault_kind,
            fault_service,
            episodes,
            mean_mttr: (!mttrs.is_empty())
                .then(|| mttrs.iter().map(|&m| f64::from(m)).sum::<f64>() / mttrs.len() as f64),
        })
        .collect();

    rows.sort_by(|a, b| match (a.mean_mttr, b.mean_mttr) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(kind: FaultKind, service: ServiceId, mttr: Option<u32>) -> EpisodeSummary {
        EpisodeSummary {
            seed: 1,
            steps: 240,
            fault_kind: kind,
            fault_service: service,
            fault_start_tick: 40,
            fault_duration: 30,
            fault_severity: 0.5,
            anomaly_steps: 0,
            slo_steps: 0,
            first_violation_tick: mttr.map(|_| 40),
            recovery_tick: mttr.map(|m| 40 + m),
            mttr_proxy: mttr,
            total_reward: 0.0,
            action_counts: Vec::new(),
        }
    }

    #[test]
    fn test_mttr_grouping_and_order() {
        let rows = mttr_by_fault(&[
            summary(FaultKind::LatencySpike, ServiceId::Db, Some(10)),
            summary(FaultKind::LatencySpike, ServiceId::Db, Some(20)),
            summary(FaultKind::ErrorBurst, ServiceId::Api, None),
            summary(FaultKind::CachePoison, ServiceId::Cache, Some(4)),
            summary(FaultKind::CachePoison, ServiceId::Cache, None),
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].fault_kind, FaultKind::CachePoison);
        assert_eq!(rows[0].mean_mttr, Some(4.0));
        assert_eq!(rows[0].episodes, 2);
        assert_eq!(rows[1].mean_mttr, Some(15.0));
        assert_eq!(rows[2].fault_kind, FaultKind::ErrorBurst);
        assert_eq!(rows[2].mean_mttr, None);
    }

    #[test]
    fn test_run_episode_rejects_invalid_config() {
        let config = SimConfig::default().with_steps(0);
        assert!(matches!(run_episode(&config), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_short_episode_summary() {
        let config = SimConfig {
            detector_window: 5,
            n_estimators: 20,
            ..SimConfig::default().with_seed(2).with_steps(40)
        };
        let run = run_episode(&config).unwrap();
        assert_eq!(run.trace.len(), 40);
        assert_eq!(run.summary.steps, 40);
        assert_eq!(run.trace.first().unwrap().0.tick, 1);

        let counted: u32 = run.summary.action_counts.iter().map(|c| c.count).sum();
        assert_eq!(counted, 40);
        for pair in run.summary.action_counts.windows(2) {
            assert!(
                pair[0].count > pair[1].count
                    || (pair[0].count == pair[1].count && pair[0].action < pair[1].action)
            );
        }
    }

    #[test]
    fn test_evaluate_uses_consecutive_seeds() {
        let config = SimConfig {
            detector_window: 5,
            n_estimators: 10,
            ..SimConfig::default().with_steps(30)
        };
        let mut seen = Vec::new();
        let summaries = evaluate_with_progress(&config, 10, 3, |done, s| seen.push((done, s.seed)))
            .unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(seen, vec![(1, 10), (2, 11), (3, 12)]);
    }
}
