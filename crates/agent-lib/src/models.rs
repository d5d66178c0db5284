//! Core data models shared by the simulator and the agent

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// API p95 latency above which a tick violates the SLO (ms)
pub const SLO_LATENCY_MS: f64 = 220.0;

/// API error rate above which a tick violates the SLO
pub const SLO_ERROR_RATE: f64 = 0.06;

/// Services in the simulated topology: `api` depends on `db` and `cache`.
///
/// The derived ordering (api, db, cache) is the iteration order of every
/// per-service map in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    Api,
    Db,
    Cache,
}

impl ServiceId {
    pub const ALL: [ServiceId; 3] = [ServiceId::Api, ServiceId::Db, ServiceId::Cache];

    /// Backing services, in the order the simulator computes them
    pub const DEPENDENCIES: [ServiceId; 2] = [ServiceId::Db, ServiceId::Cache];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Api => "api",
            ServiceId::Db => "db",
            ServiceId::Cache => "cache",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(ServiceId::Api),
            "db" => Ok(ServiceId::Db),
            "cache" => Ok(ServiceId::Cache),
            other => Err(SimError::UnknownService(other.to_string())),
        }
    }
}

/// A value per service
pub type ServiceMap<T> = BTreeMap<ServiceId, T>;

/// Per-tick telemetry snapshot emitted by the simulated system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub latency_ms_p95: ServiceMap<f64>,
    pub error_rate: ServiceMap<f64>,
    pub cpu_util: ServiceMap<f64>,
    pub mem_util: ServiceMap<f64>,
    pub req_rate: f64,
    pub slo_violation: bool,
}

impl Telemetry {
    /// Build a snapshot, deriving the SLO flag from the API fields
    pub fn new(
        latency_ms_p95: ServiceMap<f64>,
        error_rate: ServiceMap<f64>,
        cpu_util: ServiceMap<f64>,
        mem_util: ServiceMap<f64>,
        req_rate: f64,
    ) -> Self {
        let api_latency = latency_ms_p95.get(&ServiceId::Api).copied().unwrap_or(0.0);
        let api_error = error_rate.get(&ServiceId::Api).copied().unwrap_or(0.0);
        Self {
            slo_violation: is_slo_violation(api_latency, api_error),
            latency_ms_p95,
            error_rate,
            cpu_util,
            mem_util,
            req_rate,
        }
    }

    pub fn latency(&self, service: ServiceId) -> f64 {
        self.latency_ms_p95.get(&service).copied().unwrap_or(0.0)
    }

    pub fn errors(&self, service: ServiceId) -> f64 {
        self.error_rate.get(&service).copied().unwrap_or(0.0)
    }

    pub fn cpu(&self, service: ServiceId) -> f64 {
        self.cpu_util.get(&service).copied().unwrap_or(0.0)
    }

    pub fn mem(&self, service: ServiceId) -> f64 {
        self.mem_util.get(&service).copied().unwrap_or(0.0)
    }

    pub fn api_latency_breached(&self) -> bool {
        self.latency(ServiceId::Api) > SLO_LATENCY_MS
    }

    pub fn api_errors_breached(&self) -> bool {
        self.errors(ServiceId::Api) > SLO_ERROR_RATE
    }
}

/// SLO rule: API latency above 220 ms or API error rate above 6%
pub fn is_slo_violation(api_latency_ms: f64, api_error_rate: f64) -> bool {
    api_latency_ms > SLO_LATENCY_MS || api_error_rate > SLO_ERROR_RATE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(api_latency: f64, api_error: f64) -> Telemetry {
        let mut lat = ServiceMap::new();
        let mut err = ServiceMap::new();
        let mut cpu = ServiceMap::new();
        let mut mem = ServiceMap::new();
        for s in ServiceId::ALL {
            lat.insert(s, 20.0);
            err.insert(s, 0.004);
            cpu.insert(s, 0.3);
            mem.insert(s, 0.3);
        }
        lat.insert(ServiceId::Api, api_latency);
        err.insert(ServiceId::Api, api_error);
        Telemetry::new(lat, err, cpu, mem, 150.0)
    }

    #[test]
    fn test_slo_thresholds_are_strict() {
        assert!(!telemetry(220.0, 0.06).slo_violation);
        assert!(telemetry(220.01, 0.0).slo_violation);
        assert!(telemetry(10.0, 0.0601).slo_violation);
    }

    #[test]
    fn test_service_id_round_trip_names() {
        for s in ServiceId::ALL {
            assert_eq!(s.as_str().parse::<ServiceId>().unwrap(), s);
        }
        assert!(matches!(
            "queue".parse::<ServiceId>(),
            Err(SimError::UnknownService(name)) if name == "queue"
        ));
    }

    #[test]
    fn test_service_order_is_fixed() {
        let mut map = ServiceMap::new();
        map.insert(ServiceId::Cache, 1);
        map.insert(ServiceId::Api, 2);
        map.insert(ServiceId::Db, 3);
        let keys: Vec<_> = map.keys().copied().collect();
        assert_eq!(keys, ServiceId::ALL.to_vec());
    }
}
