//! Closed-loop incident-response simulator
//!
//! This crate provides the core functionality for:
//! - A simulated three-service system with injected faults
//! - Per-service anomaly detection on a learned baseline
//! - Correlation-based root-cause diagnosis
//! - Bandit-driven remediation with safety cooldowns
//! - Episode running, batch evaluation, and observability

pub mod agent;
pub mod anomaly;
pub mod config;
pub mod diagnoser;
pub mod error;
pub mod models;
pub mod observability;
pub mod policy;
pub mod runner;
pub mod sim;

pub use agent::{Agent, AgentStep};
pub use anomaly::{AnomalyDetector, Detection};
pub use config::SimConfig;
pub use diagnoser::{Diagnoser, RcaHypothesis};
pub use error::{Result, SimError};
pub use models::*;
pub use observability::{LoopMetrics, StructuredLogger};
pub use policy::{Decision, IncidentSignature, Policy, Ucb1Bandit};
pub use runner::{evaluate, mttr_by_fault, run_episode, EpisodeRun, EpisodeSummary, MttrGroup};
pub use sim::{Action, ActionRecord, EpisodeController, FaultEvent, FaultKind, StepInfo, StepResult};
