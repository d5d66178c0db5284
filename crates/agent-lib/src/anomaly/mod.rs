//! Anomaly detection over service telemetry
//!
//! This module provides:
//! - Feature extraction from raw telemetry
//! - An isolation forest baseline model
//! - The per-service detector that trains once and scores every tick

mod detector;
mod features;
mod isolation_forest;

pub use detector::{AnomalyDetector, Detection, API_SCORE_THRESHOLD, GLOBAL_SCORE_THRESHOLD};
pub use features::{featurize, FeatureVector, ServiceFeatures, GLOBAL_FEATURES, SERVICE_FEATURES};
pub use isolation_forest::IsolationForest;
