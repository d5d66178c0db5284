//! Root-cause diagnosis
//!
//! Correlation heuristics, not causal inference: the most anomalous
//! service is the first guess, then the service whose latency and error
//! series track the API's symptoms most closely over the recent window
//! takes over if it correlates better.

use crate::config::SimConfig;
use crate::models::{ServiceId, ServiceMap, Telemetry};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Default number of telemetry snapshots retained
pub const DEFAULT_HISTORY_CAP: usize = 200;

/// Most recent snapshots used for correlation
pub const CORRELATION_WINDOW: usize = 40;

/// Below this many snapshots only the anomaly ranking is used
pub const MIN_CORRELATION_SAMPLES: usize = 8;

/// Standard deviation under which a series counts as flat
const FLAT_SERIES_EPSILON: f64 = 1e-9;

/// Order in which services are examined for correlation
const CANDIDATE_ORDER: [ServiceId; 3] = [ServiceId::Api, ServiceId::Db, ServiceId::Cache];

/// A root-cause guess with a confidence and an explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RcaHypothesis {
    pub primary_service: ServiceId,
    pub confidence: f64,
    pub rationale: String,
}

impl RcaHypothesis {
    pub fn new(primary_service: ServiceId, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            primary_service,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }

    /// Returned while the detector has no scores yet
    pub fn untrained() -> Self {
        Self::new(
            ServiceId::Api,
            0.1,
            "Detector not trained yet; defaulting to api.",
        )
    }

    /// Placeholder used on ticks without any incident signal
    pub fn monitoring() -> Self {
        Self::new(
            ServiceId::Api,
            0.05,
            "Everything looks normal; monitoring only.",
        )
    }
}

pub struct Diagnoser {
    history: VecDeque<Telemetry>,
    cap: usize,
}

impl Default for Diagnoser {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl Diagnoser {
    pub fn new(cap: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.history_cap)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Record a snapshot, evicting the oldest beyond the cap
    pub fn observe(&mut self, telemetry: &Telemetry) {
        self.history.push_back(telemetry.clone());
        while self.history.len() > self.cap {
            self.history.pop_front();
        }
    }

    /// Produce a single-service hypothesis from the detector's scores
    pub fn diagnose(&self, anomaly_scores: &ServiceMap<f64>) -> RcaHypothesis {
        let Some((top_service, top_score)) = top_scored(anomaly_scores) else {
            return RcaHypothesis::untrained();
        };

        let start = self.history.len().saturating_sub(CORRELATION_WINDOW);
        let window: Vec<&Telemetry> = self.history.range(start..).collect();
        if window.len() < MIN_CORRELATION_SAMPLES {
            return RcaHypothesis::new(
                top_service,
                (0.15 + top_score).min(0.6),
                format!(
                    "Most anomalous service: {} (score={:.2}).",
                    top_service, top_score
                ),
            );
        }

        let api_latency = series(&window, |t| t.latency(ServiceId::Api));
        let api_errors = series(&window, |t| t.errors(ServiceId::Api));

        let mut best = (top_service, 0.0, 0.0);
        for service in CANDIDATE_ORDER {
            let c_lat = pearson(&series(&window, |t| t.latency(service)), &api_latency).abs();
            let c_err = pearson(&series(&window, |t| t.errors(service)), &api_errors).abs();
            if c_lat + c_err > best.1 + best.2 {
                best = (service, c_lat, c_err);
            }
        }

        let (service, corr_latency, corr_errors) = best;
        let score = anomaly_scores.get(&service).copied().unwrap_or(0.0);
        let confidence = (0.2 + 0.9 * score + 0.35 * (corr_latency + corr_errors)).min(0.95);

        debug!(
            service = %service,
            corr_latency = corr_latency,
            corr_errors = corr_errors,
            anomaly_score = score,
            "Diagnosis"
        );

        RcaHypothesis::new(
            service,
            confidence,
            format!(
                "{} is the likely root cause: most correlated with API symptoms \
                 (corr_lat={:.2}, corr_err={:.2}) with anomaly_score={:.2}.",
                service, corr_latency, corr_errors, score
            ),
        )
    }
}

/// Highest-scored service; ties go to the earlier service in map order
fn top_scored(scores: &ServiceMap<f64>) -> Option<(ServiceId, f64)> {
    scores.iter().fold(None, |best, (&service, &score)| match best {
        Some((_, best_score)) if best_score >= score => best,
        _ => Some((service, score)),
    })
}

fn series<F: Fn(&Telemetry) -> f64>(window: &[&Telemetry], f: F) -> Vec<f64> {
    window.iter().map(|t| f(t)).collect()
}

/// Pearson correlation; 0 when either series is flat or lengths differ
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let std_x = (var_x / n).sqrt();
    let std_y = (var_y / n).sqrt();
    if std_x < FLAT_SERIES_EPSILON || std_y < FLAT_SERIES_EPSILON {
        return 0.0;
    }
    (cov / n / (std_x * std_y)).clamp(-1.0, 1.0)
}
