//! Error types for the simulator core

use thiserror::Error;

/// Errors surfaced by the simulator's public operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Action record carried a `type` tag outside the playbook
    #[error("Unknown action type: {0}")]
    InvalidAction(String),

    /// Action record is missing a field its type requires
    #[error("Action '{action}' requires field '{field}'")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
