//! Playbook actions
//!
//! [`Action`] is the closed set the agent chooses from. [`ActionRecord`]
//! is the loosely-typed tagged form used at the edges (JSON, CLI), and
//! converting it is where unknown action types are rejected.

use crate::error::SimError;
use crate::models::ServiceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica delta used when a scale record omits `delta`
pub const DEFAULT_SCALE_DELTA: i32 = 1;

/// Traffic factor used when a limit_traffic record omits `factor`
pub const DEFAULT_TRAFFIC_FACTOR: f64 = 0.7;

fn default_delta() -> i32 {
    DEFAULT_SCALE_DELTA
}

fn default_factor() -> f64 {
    DEFAULT_TRAFFIC_FACTOR
}

/// A remediation action the environment can execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Restart {
        service: ServiceId,
    },
    Scale {
        service: ServiceId,
        #[serde(default = "default_delta")]
        delta: i32,
    },
    ClearCache,
    LimitTraffic {
        #[serde(default = "default_factor")]
        factor: f64,
    },
    Noop,
}

impl Action {
    pub fn restart(service: ServiceId) -> Self {
        Action::Restart { service }
    }

    pub fn scale_up(service: ServiceId) -> Self {
        Action::Scale {
            service,
            delta: DEFAULT_SCALE_DELTA,
        }
    }

    pub fn limit_traffic() -> Self {
        Action::LimitTraffic {
            factor: DEFAULT_TRAFFIC_FACTOR,
        }
    }

    /// The `type` tag of this action
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Restart { .. } => "restart",
            Action::Scale { .. } => "scale",
            Action::ClearCache => "clear_cache",
            Action::LimitTraffic { .. } => "limit_traffic",
            Action::Noop => "noop",
        }
    }

    /// Stable key for learning statistics and cooldowns.
    ///
    /// Restart and scale are keyed per service; limit_traffic ignores its
    /// factor.
    pub fn key(&self) -> ActionKey {
        match self {
            Action::Restart { service } => ActionKey::Restart(*service),
            Action::Scale { service, .. } => ActionKey::Scale(*service),
            Action::ClearCache => ActionKey::ClearCache,
            Action::LimitTraffic { .. } => ActionKey::LimitTraffic,
            Action::Noop => ActionKey::Noop,
        }
    }

    pub fn is_restart(&self) -> bool {
        matches!(self, Action::Restart { .. })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Restart { service } => write!(f, "restart({})", service),
            Action::Scale { service, delta } => write!(f, "scale({}, {:+})", service, delta),
            Action::ClearCache => f.write_str("clear_cache"),
            Action::LimitTraffic { factor } => write!(f, "limit_traffic({:.2})", factor),
            Action::Noop => f.write_str("noop"),
        }
    }
}

/// Normalized identity of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKey {
    Restart(ServiceId),
    Scale(ServiceId),
    ClearCache,
    LimitTraffic,
    Noop,
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKey::Restart(s) => write!(f, "restart:{}", s),
            ActionKey::Scale(s) => write!(f, "scale:{}", s),
            ActionKey::ClearCache => f.write_str("clear_cache"),
            ActionKey::LimitTraffic => f.write_str("limit_traffic"),
            ActionKey::Noop => f.write_str("noop"),
        }
    }
}

/// Untyped tagged action record as exchanged with collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
}

impl ActionRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    fn require_service(&self, action: &'static str) -> Result<ServiceId, SimError> {
        self.service
            .as_deref()
            .ok_or(SimError::MissingField {
                action,
                field: "service",
            })?
            .parse()
    }
}

impl TryFrom<&ActionRecord> for Action {
    type Error = SimError;

    fn try_from(record: &ActionRecord) -> Result<Self, Self::Error> {
        match record.kind.as_str() {
            "restart" => Ok(Action::Restart {
                service: record.require_service("restart")?,
            }),
            "scale" => Ok(Action::Scale {
                service: record.require_service("scale")?,
                delta: record.delta.unwrap_or(DEFAULT_SCALE_DELTA),
            }),
            "clear_cache" => Ok(Action::ClearCache),
            "limit_traffic" => Ok(Action::LimitTraffic {
                factor: record.factor.unwrap_or(DEFAULT_TRAFFIC_FACTOR),
            }),
            "noop" => Ok(Action::Noop),
            other => Err(SimError::InvalidAction(other.to_string())),
        }
    }
}

impl From<&Action> for ActionRecord {
    fn from(action: &Action) -> Self {
        let mut record = ActionRecord::new(action.type_name());
        match action {
            Action::Restart { service } => record.service = Some(service.to_string()),
            Action::Scale { service, delta } => {
                record.service = Some(service.to_string());
                record.delta = Some(*delta);
            }
            Action::LimitTraffic { factor } => record.factor = Some(*factor),
            Action::ClearCache | Action::Noop => {}
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults() {
        let scale: ActionRecord =
            serde_json::from_str(r#"{"type":"scale","service":"db"}"#).unwrap();
        assert_eq!(
            Action::try_from(&scale).unwrap(),
            Action::Scale {
                service: ServiceId::Db,
                delta: 1
            }
        );

        let limit = ActionRecord::new("limit_traffic");
        assert_eq!(
            Action::try_from(&limit).unwrap(),
            Action::LimitTraffic { factor: 0.7 }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let record = ActionRecord::new("reboot_cluster");
        let err = Action::try_from(&record).unwrap_err();
        assert_eq!(err, SimError::InvalidAction("reboot_cluster".to_string()));
        assert!(err.to_string().contains("reboot_cluster"));
    }

    #[test]
    fn test_restart_requires_service() {
        let err = Action::try_from(&ActionRecord::new("restart")).unwrap_err();
        assert!(matches!(err, SimError::MissingField { field: "service", .. }));

        let err = Action::try_from(&ActionRecord::new("restart").with_service("queue")).unwrap_err();
        assert!(matches!(err, SimError::UnknownService(_)));
    }

    #[test]
    fn test_keys_ignore_parameters() {
        assert_eq!(
            Action::LimitTraffic { factor: 0.5 }.key(),
            Action::limit_traffic().key()
        );
        assert_eq!(
            Action::Scale {
                service: ServiceId::Api,
                delta: 3
            }
            .key(),
            ActionKey::Scale(ServiceId::Api)
        );
        assert_ne!(
            Action::restart(ServiceId::Api).key(),
            Action::restart(ServiceId::Db).key()
        );
        assert_eq!(ActionKey::Restart(ServiceId::Cache).to_string(), "restart:cache");
    }

    #[test]
    fn test_serde_tagged_form() {
        let json = serde_json::to_string(&Action::restart(ServiceId::Cache)).unwrap();
        assert_eq!(json, r#"{"type":"restart","service":"cache"}"#);
        let back: Action = serde_json::from_str(r#"{"type":"noop"}"#).unwrap();
        assert_eq!(back, Action::Noop);
        let record = ActionRecord::from(&Action::scale_up(ServiceId::Db));
        assert_eq!(record.delta, Some(1));
        assert_eq!(record.service.as_deref(), Some("db"));
    }
}
