//! Closed-loop agent
//!
//! One cycle per tick: observe, detect, diagnose and decide when something
//! looks wrong, act, advance the environment, then learn from the reward.

use crate::anomaly::{AnomalyDetector, Detection};
use crate::config::SimConfig;
use crate::diagnoser::{Diagnoser, RcaHypothesis};
use crate::models::Telemetry;
use crate::observability::{LoopMetrics, StructuredLogger};
use crate::policy::{Decision, Policy};
use crate::sim::{EpisodeController, StepResult};
use serde::Serialize;
use tracing::trace;

/// Trace record for one decision cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStep {
    pub tick: u32,
    /// SLO state of the telemetry the agent acted on
    pub slo_violation: bool,
    pub detection: Detection,
    pub rca: RcaHypothesis,
    pub decision: Decision,
}

impl AgentStep {
    /// Whether this cycle went through diagnosis and policy
    pub fn is_incident(&self) -> bool {
        self.detection.is_anomaly || self.slo_violation
    }
}

pub struct Agent {
    detector: AnomalyDetector,
    diagnoser: Diagnoser,
    policy: Policy,
    logger: StructuredLogger,
    metrics: LoopMetrics,
}

impl Agent {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            detector: AnomalyDetector::from_config(config),
            diagnoser: Diagnoser::from_config(config),
            policy: Policy::from_config(config),
            logger: StructuredLogger::new(config.seed),
            metrics: LoopMetrics::new(),
        }
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Run one detect, diagnose, act, step, learn cycle
    pub fn step(
        &mut self,
        env: &mut EpisodeController,
        telemetry: &Telemetry,
        tick: u32,
    ) -> (AgentStep, StepResult) {
        self.diagnoser.observe(telemetry);
        let was_trained = self.detector.is_trained();
        let detection = self.detector.observe(telemetry);
        if !was_trained && self.detector.is_trained() {
            self.logger
                .log_detector_trained(tick, self.detector.training_size());
        }

        let (rca, decision) = if detection.is_anomaly || telemetry.slo_violation {
            let rca = self.diagnoser.diagnose(&detection.scores);
            let decision = self.policy.decide(telemetry, &rca, tick);
            self.logger.log_decision(
                tick,
                rca.primary_service,
                rca.confidence,
                &decision.action,
                &decision.rationale,
            );
            (rca, decision)
        } else {
            (RcaHypothesis::monitoring(), Decision::idle())
        };

        env.act(&decision.action);
        let result = env.step();

        self.policy.learn(
            telemetry,
            &result.telemetry,
            &rca,
            &decision.action,
            result.reward,
        );

        self.metrics
            .observe_tick(telemetry.slo_violation, detection.is_anomaly, result.reward);
        self.metrics.inc_decision(&decision.action);
        if let (Some(first), Some(recovered)) =
            (result.info.first_violation_tick, result.info.recovery_tick)
        {
            if recovered == result.info.tick {
                self.logger.log_recovery(recovered, first);
                self.metrics.observe_mttr(recovered.saturating_sub(first));
            }
        }

        trace!(
            tick = tick,
            anomaly = detection.is_anomaly,
            action = %decision.action,
            reward = result.reward,
            "Agent cycle"
        );

        (
            AgentStep {
                tick,
                slo_violation: telemetry.slo_violation,
                detection,
                rca,
                decision,
            },
            result,
        )
    }
}
