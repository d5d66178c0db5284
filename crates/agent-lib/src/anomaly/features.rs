//! Feature extraction for the anomaly detector
//!
//! Maps raw telemetry to numeric vectors: one per service for the
//! per-service baseline models, plus a global vector of user-visible
//! symptoms.

use crate::models::{ServiceId, ServiceMap, Telemetry};
use serde::Serialize;

/// Features per service: [p95 latency, error rate, cpu, mem]
pub const SERVICE_FEATURES: usize = 4;

/// Global features: [request rate, api latency, api error rate]
pub const GLOBAL_FEATURES: usize = 3;

pub type ServiceFeatures = [f64; SERVICE_FEATURES];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub service_features: ServiceMap<ServiceFeatures>,
    pub global_features: [f64; GLOBAL_FEATURES],
}

/// Featurize one telemetry snapshot
pub fn featurize(telemetry: &Telemetry) -> FeatureVector {
    let service_features = telemetry
        .latency_ms_p95
        .keys()
        .map(|&service| {
            (
                service,
                [
                    telemetry.latency(service),
                    telemetry.errors(service),
                    telemetry.cpu(service),
                    telemetry.mem(service),
                ],
            )
        })
        .collect();

    FeatureVector {
        service_features,
        global_features: [
            telemetry.req_rate,
            telemetry.latency(ServiceId::Api),
            telemetry.errors(ServiceId::Api),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_telemetry() -> Telemetry {
        let mut lat = ServiceMap::new();
        let mut err = ServiceMap::new();
        let mut cpu = ServiceMap::new();
        let mut mem = ServiceMap::new();
        for (i, s) in ServiceId::ALL.iter().enumerate() {
            lat.insert(*s, 10.0 * (i + 1) as f64);
            err.insert(*s, 0.01 * (i + 1) as f64);
            cpu.insert(*s, 0.25 + 0.125 * i as f64);
            mem.insert(*s, 0.5 + 0.125 * i as f64);
        }
        Telemetry::new(lat, err, cpu, mem, 144.0)
    }

    #[test]
    fn test_service_vectors_in_fixed_layout() {
        let fv = featurize(&sample_telemetry());
        assert_eq!(fv.service_features.len(), 3);
        assert_eq!(fv.service_features[&ServiceId::Db], [20.0, 0.02, 0.375, 0.625]);
    }

    #[test]
    fn test_global_vector_tracks_api() {
        let fv = featurize(&sample_telemetry());
        assert_eq!(fv.global_features, [144.0, 10.0, 0.01]);
    }
}
