//! Per-service anomaly detector
//!
//! Buffers featurized telemetry per service. Once every service has
//! `2 * window` samples, one isolation forest per service is fitted on its
//! first `2 * window` samples, all in the same call. The models are never
//! refitted; every later observation is scored against them.

use super::features::{featurize, ServiceFeatures};
use super::isolation_forest::IsolationForest;
use crate::config::SimConfig;
use crate::models::{ServiceId, ServiceMap, Telemetry};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// API score above which the detector fires
pub const API_SCORE_THRESHOLD: f64 = 0.15;

/// Mean score above which the detector fires
pub const GLOBAL_SCORE_THRESHOLD: f64 = 0.12;

/// Detector output for one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub is_anomaly: bool,
    /// Per-service scores, higher = more anomalous. Empty until trained.
    pub scores: ServiceMap<f64>,
    /// Mean of `scores`, 0 when empty
    pub global_score: f64,
}

impl Detection {
    /// Detection reported before the models exist
    pub fn untrained() -> Self {
        Self {
            is_anomaly: false,
            scores: ServiceMap::new(),
            global_score: 0.0,
        }
    }

    fn from_scores(scores: ServiceMap<f64>) -> Self {
        if scores.is_empty() {
            return Self::untrained();
        }
        let global_score = scores.values().sum::<f64>() / scores.len() as f64;
        let api_score = scores.get(&ServiceId::Api).copied().unwrap_or(0.0);
        Self {
            is_anomaly: api_score > API_SCORE_THRESHOLD || global_score > GLOBAL_SCORE_THRESHOLD,
            scores,
            global_score,
        }
    }
}

pub struct AnomalyDetector {
    window: usize,
    contamination: f64,
    n_estimators: usize,
    seed: u64,
    buffers: ServiceMap<VecDeque<ServiceFeatures>>,
    models: ServiceMap<IsolationForest>,
    trained: bool,
}

impl AnomalyDetector {
    pub fn new(window: usize, contamination: f64, n_estimators: usize, seed: u64) -> Self {
        Self {
            window: window.max(1),
            contamination,
            n_estimators,
            seed,
            buffers: ServiceMap::new(),
            models: ServiceMap::new(),
            trained: false,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(
            config.detector_window,
            config.contamination,
            config.n_estimators,
            config.seed,
        )
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Samples needed per service before training
    pub fn training_size(&self) -> usize {
        self.window * 2
    }

    fn buffer_cap(&self) -> usize {
        self.window * 4
    }

    pub fn buffered(&self, service: ServiceId) -> usize {
        self.buffers.get(&service).map(VecDeque::len).unwrap_or(0)
    }

    /// Buffer, train once ready, and score one telemetry snapshot
    pub fn observe(&mut self, telemetry: &Telemetry) -> Detection {
        let features = featurize(telemetry);
        let cap = self.buffer_cap();

        for (service, x) in &features.service_features {
            let buf = self.buffers.entry(*service).or_default();
            buf.push_back(*x);
            while buf.len() > cap {
                buf.pop_front();
            }
        }

        if !self.trained && self.ready_to_train() {
            self.train();
        }

        if !self.trained {
            return Detection::untrained();
        }

        let scores = features
            .service_features
            .iter()
            .filter_map(|(service, x)| {
                self.models
                    .get(service)
                    .map(|model| (*service, model.score(x)))
            })
            .collect();
        Detection::from_scores(scores)
    }

    fn ready_to_train(&self) -> bool {
        let need = self.training_size();
        !self.buffers.is_empty() && self.buffers.values().all(|b| b.len() >= need)
    }

    /// Fit every service's model in one pass
    fn train(&mut self) {
        let need = self.training_size();
        let models: ServiceMap<IsolationForest> = self
            .buffers
            .iter()
            .map(|(service, buf)| {
                let baseline: Vec<ServiceFeatures> = buf.iter().take(need).copied().collect();
                let mut model =
                    IsolationForest::new(self.n_estimators, self.contamination, self.seed);
                model.fit(&baseline);
                (*service, model)
            })
            .collect();

        self.models = models;
        self.trained = true;
        debug!(
            services = self.models.len(),
            samples_per_service = need,
            "Trained per-service baseline models"
        );
    }
}
