//! Simulated environment
//!
//! The environment half of the loop: a three-service system with one
//! injected fault per episode, the playbook actions that mutate it, and
//! the episode controller that scores each tick.

mod action;
mod episode;
mod fault;
mod system;

pub use action::{Action, ActionKey, ActionRecord, DEFAULT_SCALE_DELTA, DEFAULT_TRAFFIC_FACTOR};
pub use episode::{
    EpisodeController, StepInfo, StepResult, HEALTHY_REWARD, UNRECOVERED_PENALTY,
    VIOLATION_PENALTY,
};
pub use fault::{
    sample_fault, FaultEvent, FaultKind, Multipliers, CACHE_POISON_CAP_AFTER_CLEAR,
    MIN_DURATION_AFTER_RESTART,
};
pub use system::{
    ServiceState, SimulatedSystem, MAX_REPLICAS, MAX_TRAFFIC_LIMIT, MIN_REPLICAS,
    MIN_TRAFFIC_LIMIT,
};
