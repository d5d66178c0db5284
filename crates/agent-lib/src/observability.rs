//! Observability for the control loop
//!
//! Provides:
//! - Prometheus metrics (ticks, SLO violations, anomalies, decisions, reward, MTTR)
//! - Structured logging with tracing

use crate::models::ServiceId;
use crate::sim::{Action, FaultEvent};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Buckets around the four possible per-tick rewards
const REWARD_BUCKETS: &[f64] = &[-1.01, -0.5, 0.5, 0.99, 1.0];

/// MTTR buckets in ticks
const MTTR_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<LoopMetricsInner> = OnceLock::new();

struct LoopMetricsInner {
    ticks: IntCounter,
    slo_violation_ticks: IntCounter,
    anomaly_ticks: IntCounter,
    decisions: IntCounterVec,
    step_reward: Histogram,
    mttr_ticks: Histogram,
    episodes_completed: IntCounter,
}

impl LoopMetricsInner {
    fn new() -> Self {
        Self {
            ticks: register_int_counter!(
                "aiops_ticks_total",
                "Simulated ticks processed by the agent loop"
            )
            .expect("Failed to register ticks_total"),

            slo_violation_ticks: register_int_counter!(
                "aiops_slo_violation_ticks_total",
                "Ticks that started in SLO violation"
            )
            .expect("Failed to register slo_violation_ticks_total"),

            anomaly_ticks: register_int_counter!(
                "aiops_anomaly_ticks_total",
                "Ticks the detector flagged as anomalous"
            )
            .expect("Failed to register anomaly_ticks_total"),

            decisions: register_int_counter_vec!(
                "aiops_decisions_total",
                "Actions executed by the agent, by action type",
                &["action"]
            )
            .expect("Failed to register decisions_total"),

            step_reward: register_histogram!(
                "aiops_step_reward",
                "Per-tick reward returned by the environment",
                REWARD_BUCKETS.to_vec()
            )
            .expect("Failed to register step_reward"),

            mttr_ticks: register_histogram!(
                "aiops_mttr_ticks",
                "Ticks from first SLO violation to recovery",
                MTTR_BUCKETS.to_vec()
            )
            .expect("Failed to register mttr_ticks"),

            episodes_completed: register_int_counter!(
                "aiops_episodes_completed_total",
                "Episodes run to completion"
            )
            .expect("Failed to register episodes_completed_total"),
        }
    }
}

/// Loop metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same collectors.
#[derive(Clone)]
pub struct LoopMetrics {
    _private: (),
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopMetrics {
    /// Create a handle, registering the collectors on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(LoopMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &LoopMetricsInner {
        GLOBAL_METRICS.get_or_init(LoopMetricsInner::new)
    }

    /// Record one agent cycle
    pub fn observe_tick(&self, slo_violation: bool, anomaly: bool, reward: f64) {
        let inner = self.inner();
        inner.ticks.inc();
        if slo_violation {
            inner.slo_violation_ticks.inc();
        }
        if anomaly {
            inner.anomaly_ticks.inc();
        }
        inner.step_reward.observe(reward);
    }

    pub fn inc_decision(&self, action: &Action) {
        self.inner()
            .decisions
            .with_label_values(&[action.type_name()])
            .inc();
    }

    pub fn observe_mttr(&self, ticks: u32) {
        self.inner().mttr_ticks.observe(f64::from(ticks));
    }

    pub fn inc_episodes_completed(&self) {
        self.inner().episodes_completed.inc();
    }

    pub fn ticks(&self) -> u64 {
        self.inner().ticks.get()
    }

    pub fn decisions(&self, action_type: &str) -> u64 {
        self.inner()
            .decisions
            .with_label_values(&[action_type])
            .get()
    }

    pub fn episodes_completed(&self) -> u64 {
        self.inner().episodes_completed.get()
    }
}

/// Render every registered collector in the Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Structured logger for loop events
///
/// Scoped to one episode; every event carries the episode seed.
#[derive(Clone)]
pub struct StructuredLogger {
    seed: u64,
}

impl StructuredLogger {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Log the episode's sampled fault
    pub fn log_fault_injected(&self, fault: &FaultEvent) {
        info!(
            event = "fault_injected",
            seed = self.seed,
            fault_kind = %fault.kind(),
            service = %fault.service(),
            start_tick = fault.start_tick(),
            duration = fault.duration(),
            severity = fault.severity(),
            "Injected episode fault"
        );
    }

    pub fn log_detector_trained(&self, tick: u32, samples_per_service: usize) {
        info!(
            event = "detector_trained",
            seed = self.seed,
            tick = tick,
            samples_per_service = samples_per_service,
            "Anomaly detector trained on baseline"
        );
    }

    /// Log an incident-handling decision
    pub fn log_decision(
        &self,
        tick: u32,
        suspect: ServiceId,
        confidence: f64,
        action: &Action,
        rationale: &str,
    ) {
        info!(
            event = "incident_decision",
            seed = self.seed,
            tick = tick,
            suspect = %suspect,
            confidence = confidence,
            action = %action,
            rationale = %rationale,
            "Agent acted on incident"
        );
    }

    pub fn log_recovery(&self, tick: u32, first_violation_tick: u32) {
        info!(
            event = "slo_recovered",
            seed = self.seed,
            tick = tick,
            first_violation_tick = first_violation_tick,
            mttr_ticks = tick.saturating_sub(first_violation_tick),
            "Recovered from SLO violation"
        );
    }

    /// Log episode completion; unrecovered incidents are warnings
    pub fn log_episode_complete(
        &self,
        steps: u32,
        total_reward: f64,
        first_violation_tick: Option<u32>,
        mttr_proxy: Option<u32>,
    ) {
        if first_violation_tick.is_some() && mttr_proxy.is_none() {
            warn!(
                event = "episode_complete",
                seed = self.seed,
                steps = steps,
                total_reward = total_reward,
                first_violation_tick = ?first_violation_tick,
                "Episode ended without recovering"
            );
        } else {
            info!(
                event = "episode_complete",
                seed = self.seed,
                steps = steps,
                total_reward = total_reward,
                first_violation_tick = ?first_violation_tick,
                mttr_proxy = ?mttr_proxy,
                "Episode complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_metrics_record() {
        let metrics = LoopMetrics::new();
        let before = metrics.ticks();
        metrics.observe_tick(true, false, -1.0);
        metrics.inc_decision(&Action::ClearCache);
        metrics.observe_mttr(12);
        assert!(metrics.ticks() > before);
        assert!(metrics.decisions("clear_cache") >= 1);
    }

    #[test]
    fn test_render_metrics_text() {
        let metrics = LoopMetrics::new();
        metrics.inc_episodes_completed();
        let text = render_metrics().unwrap();
        assert!(text.contains("aiops_episodes_completed_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new(7);
        assert_eq!(logger.seed(), 7);
    }
}
