//! Simulated microservice system
//!
//! A three-service topology where `api` depends on `db` and `cache`.
//! Each tick the system derives telemetry from a sinusoidal workload, the
//! hidden per-service state, the active fault, and dependency propagation:
//! slow or failing dependencies add latency and errors to the API.
//!
//! All randomness is drawn from the caller's RNG so a seeded episode is
//! reproducible.

use super::fault::{
    FaultEvent, FaultKind, Multipliers, CACHE_POISON_CAP_AFTER_CLEAR, MIN_DURATION_AFTER_RESTART,
    RESTART_SHRINK_FRACTION,
};
use crate::models::{ServiceId, ServiceMap, Telemetry};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::{debug, trace};

pub const MIN_REPLICAS: u32 = 1;
pub const MAX_REPLICAS: u32 = 10;
pub const MIN_TRAFFIC_LIMIT: f64 = 0.4;
pub const MAX_TRAFFIC_LIMIT: f64 = 1.0;

/// Upper clamp for internal utilization state
const UTIL_CEILING: f64 = 1.2;

/// Latency above which a dependency starts slowing the API (ms)
const DEP_LATENCY_FREE_MS: f64 = 35.0;
const DEP_LATENCY_PENALTY: f64 = 0.45;
const DEP_ERROR_PENALTY: f64 = 0.6;

/// Load-curve parameters for one service
struct LoadCurve {
    per_replica_capacity: f64,
    latency_floor_ms: f64,
    latency_slope: f64,
    latency_knee: f64,
    error_floor: f64,
    error_slope: f64,
    error_knee: f64,
    cpu_floor: f64,
    cpu_slope: f64,
    mem_floor: f64,
    mem_slope: f64,
    min_latency_ms: f64,
    latency_noise_ms: f64,
    max_error_rate: f64,
}

const DEPENDENCY_CURVE: LoadCurve = LoadCurve {
    per_replica_capacity: 200.0,
    latency_floor_ms: 18.0,
    latency_slope: 55.0,
    latency_knee: 0.35,
    error_floor: 0.004,
    error_slope: 0.03,
    error_knee: 0.55,
    cpu_floor: 0.15,
    cpu_slope: 0.9,
    mem_floor: 0.18,
    mem_slope: 0.6,
    min_latency_ms: 5.0,
    latency_noise_ms: 2.0,
    max_error_rate: 0.8,
};

const API_CURVE: LoadCurve = LoadCurve {
    per_replica_capacity: 260.0,
    latency_floor_ms: 22.0,
    latency_slope: 80.0,
    latency_knee: 0.35,
    error_floor: 0.003,
    error_slope: 0.025,
    error_knee: 0.6,
    cpu_floor: 0.18,
    cpu_slope: 0.95,
    mem_floor: 0.22,
    mem_slope: 0.55,
    min_latency_ms: 8.0,
    latency_noise_ms: 3.0,
    max_error_rate: 0.9,
};

/// Hidden state of one service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceState {
    pub replicas: u32,
    pub cpu_util: f64,
    pub mem_util: f64,
    pub cache_health: f64,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            replicas: 1,
            cpu_util: 0.25,
            mem_util: 0.25,
            cache_health: 1.0,
        }
    }
}

/// Signals one service emits in a tick
struct ServiceSample {
    latency_ms: f64,
    error_rate: f64,
    cpu: f64,
    mem: f64,
}

pub struct SimulatedSystem {
    state: ServiceMap<ServiceState>,
    active_fault: Option<FaultEvent>,
    tick: u32,
    traffic_limit: f64,
}

impl Default for SimulatedSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSystem {
    pub fn new() -> Self {
        Self {
            state: fresh_state(),
            active_fault: None,
            tick: 0,
            traffic_limit: MAX_TRAFFIC_LIMIT,
        }
    }

    /// Restore defaults and install the episode's fault
    pub fn reset(&mut self, fault: FaultEvent) {
        self.state = fresh_state();
        self.active_fault = Some(fault);
        self.tick = 0;
        self.traffic_limit = MAX_TRAFFIC_LIMIT;
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn traffic_limit(&self) -> f64 {
        self.traffic_limit
    }

    pub fn active_fault(&self) -> Option<&FaultEvent> {
        self.active_fault.as_ref()
    }

    pub fn service_state(&self, service: ServiceId) -> Option<&ServiceState> {
        self.state.get(&service)
    }

    /// Advance one tick and observe
    pub fn step<R: Rng>(&mut self, rng: &mut R) -> Telemetry {
        self.tick += 1;
        self.observe(rng)
    }

    /// Produce telemetry for the current tick
    pub fn observe<R: Rng>(&mut self, rng: &mut R) -> Telemetry {
        let req_rate = self.workload(rng);

        let mut latency = ServiceMap::new();
        let mut errors = ServiceMap::new();
        let mut cpu = ServiceMap::new();
        let mut mem = ServiceMap::new();

        let mut dep_latency_penalty = 0.0;
        let mut dep_error_penalty = 0.0;

        for service in ServiceId::DEPENDENCIES {
            let sample = self.sample_service(rng, service, &DEPENDENCY_CURVE, req_rate, 0.0, 0.0);

            dep_latency_penalty +=
                (sample.latency_ms - DEP_LATENCY_FREE_MS).max(0.0) * DEP_LATENCY_PENALTY;
            dep_error_penalty += sample.error_rate * DEP_ERROR_PENALTY;

            latency.insert(service, sample.latency_ms);
            errors.insert(service, sample.error_rate);
            cpu.insert(service, sample.cpu);
            mem.insert(service, sample.mem);
        }

        let api = self.sample_service(
            rng,
            ServiceId::Api,
            &API_CURVE,
            req_rate,
            dep_latency_penalty,
            dep_error_penalty,
        );
        latency.insert(ServiceId::Api, api.latency_ms);
        errors.insert(ServiceId::Api, api.error_rate);
        cpu.insert(ServiceId::Api, api.cpu);
        mem.insert(ServiceId::Api, api.mem);

        let telemetry = Telemetry::new(latency, errors, cpu, mem, req_rate);
        trace!(
            tick = self.tick,
            req_rate = telemetry.req_rate,
            api_latency_ms = telemetry.latency(ServiceId::Api),
            api_error_rate = telemetry.errors(ServiceId::Api),
            slo_violation = telemetry.slo_violation,
            "Observed telemetry"
        );
        telemetry
    }

    /// Sinusoidal request rate with Gaussian noise, scaled by the traffic limit
    fn workload<R: Rng>(&self, rng: &mut R) -> f64 {
        let base = 120.0 + 60.0 * (0.5 + 0.5 * (self.tick as f64 / 24.0).sin());
        let noise = gauss(rng, 8.0);
        ((base + noise) * self.traffic_limit).max(10.0)
    }

    fn multipliers(&self, service: ServiceId) -> Multipliers {
        self.active_fault
            .as_ref()
            .map(|f| f.multipliers_for(service, self.tick))
            .unwrap_or(Multipliers::IDENTITY)
    }

    fn sample_service<R: Rng>(
        &mut self,
        rng: &mut R,
        service: ServiceId,
        curve: &LoadCurve,
        req_rate: f64,
        extra_latency_ms: f64,
        extra_error: f64,
    ) -> ServiceSample {
        let m = self.multipliers(service);
        let st = self.state.entry(service).or_default();

        let load = req_rate / (st.replicas as f64 * curve.per_replica_capacity);
        let latency_base = curve.latency_floor_ms
            + curve.latency_slope * (load - curve.latency_knee).max(0.0)
            + extra_latency_ms;
        let error_base =
            curve.error_floor + curve.error_slope * (load - curve.error_knee).max(0.0) + extra_error;

        st.cpu_util = (curve.cpu_floor + curve.cpu_slope * load * m.cpu
            + rng.random::<f64>() * 0.05)
            .clamp(0.0, UTIL_CEILING);
        st.mem_util = (curve.mem_floor + curve.mem_slope * load * m.mem
            + rng.random::<f64>() * 0.05)
            .clamp(0.0, UTIL_CEILING);

        let latency_ms =
            (latency_base * m.latency + gauss(rng, curve.latency_noise_ms)).max(curve.min_latency_ms);
        let error_rate =
            (error_base * m.error + gauss(rng, 0.002).abs()).clamp(0.0, curve.max_error_rate);

        ServiceSample {
            latency_ms,
            error_rate,
            cpu: st.cpu_util.clamp(0.0, 1.0),
            mem: st.mem_util.clamp(0.0, 1.0),
        }
    }

    /// Restart relieves CPU/memory pressure. Restarting the faulty service
    /// cuts an error burst or cache poisoning short.
    pub fn restart(&mut self, service: ServiceId) {
        let st = self.state.entry(service).or_default();
        st.cpu_util = (st.cpu_util * 0.6).max(0.18);
        st.mem_util = (st.mem_util * 0.6).max(0.18);
        if service == ServiceId::Cache {
            st.cache_health = 1.0;
        }

        let tick = self.tick;
        if let Some(fault) = self.active_fault.as_mut() {
            if fault.service() == service && fault.kind().shortened_by_restart() {
                let shrink = (fault.remaining(tick) as f64 * RESTART_SHRINK_FRACTION) as u32;
                let target = fault
                    .duration()
                    .saturating_sub(shrink)
                    .max(MIN_DURATION_AFTER_RESTART);
                fault.shorten_duration(target);
                debug!(
                    service = %service,
                    duration = fault.duration(),
                    "Restart shortened active fault"
                );
            }
        }
    }

    /// Adjust replicas, clamped to [1, 10]
    pub fn scale(&mut self, service: ServiceId, delta: i32) {
        let st = self.state.entry(service).or_default();
        let replicas = (st.replicas as i64 + delta as i64)
            .clamp(MIN_REPLICAS as i64, MAX_REPLICAS as i64);
        st.replicas = replicas as u32;
    }

    /// Restore cache health; caps a cache-poison fault at 8 ticks total
    pub fn clear_cache(&mut self) {
        self.state.entry(ServiceId::Cache).or_default().cache_health = 1.0;
        if let Some(fault) = self.active_fault.as_mut() {
            if fault.kind() == FaultKind::CachePoison {
                fault.shorten_duration(CACHE_POISON_CAP_AFTER_CLEAR);
            }
        }
    }

    /// Shed load: traffic factor clamped to [0.4, 1.0]; non-finite lifts the limit
    pub fn limit_traffic(&mut self, factor: f64) {
        self.traffic_limit = if factor.is_finite() {
            factor.clamp(MIN_TRAFFIC_LIMIT, MAX_TRAFFIC_LIMIT)
        } else {
            MAX_TRAFFIC_LIMIT
        };
    }
}

fn fresh_state() -> ServiceMap<ServiceState> {
    ServiceId::ALL
        .iter()
        .map(|s| (*s, ServiceState::default()))
        .collect()
}

fn gauss<R: Rng>(rng: &mut R, std_dev: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn quiet_fault() -> FaultEvent {
        FaultEvent::new(1_000, 10, ServiceId::Db, FaultKind::LatencySpike, 0.5)
    }

    #[test]
    fn test_telemetry_covers_all_services() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut system = SimulatedSystem::new();
        system.reset(quiet_fault());
        for _ in 0..50 {
            let tel = system.step(&mut rng);
            for map in [&tel.latency_ms_p95, &tel.error_rate, &tel.cpu_util, &tel.mem_util] {
                let keys: Vec<_> = map.keys().copied().collect();
                assert_eq!(keys, ServiceId::ALL.to_vec());
            }
            assert!(tel.req_rate >= 10.0);
            for s in ServiceId::ALL {
                assert!((0.0..=1.0).contains(&tel.cpu(s)));
                assert!((0.0..=1.0).contains(&tel.mem(s)));
                assert!(tel.errors(s) >= 0.0);
            }
        }
    }

    #[test]
    fn test_baseline_is_healthy() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut system = SimulatedSystem::new();
        system.reset(quiet_fault());
        let violations = (0..100).filter(|_| system.step(&mut rng).slo_violation).count();
        assert_eq!(violations, 0);
    }

    #[test]
    fn test_dependency_fault_propagates_to_api() {
        let mut healthy_rng = StdRng::seed_from_u64(5);
        let mut healthy = SimulatedSystem::new();
        healthy.reset(quiet_fault());

        let mut faulty_rng = StdRng::seed_from_u64(5);
        let mut faulty = SimulatedSystem::new();
        faulty.reset(FaultEvent::new(0, 100, ServiceId::Db, FaultKind::LatencySpike, 1.0));

        let mut healthy_api = 0.0;
        let mut faulty_api = 0.0;
        for _ in 0..20 {
            healthy_api += healthy.step(&mut healthy_rng).latency(ServiceId::Api);
            faulty_api += faulty.step(&mut faulty_rng).latency(ServiceId::Api);
        }
        assert!(faulty_api > healthy_api);
    }

    #[test]
    fn test_fault_effect_ends_at_end_tick() {
        let fault = FaultEvent::new(5, 5, ServiceId::Api, FaultKind::ErrorBurst, 1.0);

        let mut rng_a = StdRng::seed_from_u64(9);
        let mut with_fault = SimulatedSystem::new();
        with_fault.reset(fault);

        let mut rng_b = StdRng::seed_from_u64(9);
        let mut without = SimulatedSystem::new();
        without.reset(quiet_fault());

        for _ in 0..9 {
            with_fault.step(&mut rng_a);
            without.step(&mut rng_b);
        }
        // tick 10 == start + duration
        let a = with_fault.step(&mut rng_a);
        let b = without.step(&mut rng_b);
        assert_eq!(with_fault.tick(), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_scale_clamps_replicas() {
        let mut system = SimulatedSystem::new();
        system.scale(ServiceId::Api, 25);
        assert_eq!(system.service_state(ServiceId::Api).unwrap().replicas, MAX_REPLICAS);
        system.scale(ServiceId::Api, -40);
        assert_eq!(system.service_state(ServiceId::Api).unwrap().replicas, MIN_REPLICAS);
    }

    #[test]
    fn test_limit_traffic_clamps() {
        let mut system = SimulatedSystem::new();
        system.limit_traffic(0.1);
        assert_eq!(system.traffic_limit(), MIN_TRAFFIC_LIMIT);
        system.limit_traffic(3.0);
        assert_eq!(system.traffic_limit(), MAX_TRAFFIC_LIMIT);
        system.limit_traffic(0.7);
        assert_eq!(system.traffic_limit(), 0.7);
    }

    #[test]
    fn test_limit_traffic_ignores_non_finite_factor() {
        let mut system = SimulatedSystem::new();
        system.limit_traffic(0.5);
        system.limit_traffic(f64::NAN);
        assert_eq!(system.traffic_limit(), MAX_TRAFFIC_LIMIT);
        system.limit_traffic(f64::NEG_INFINITY);
        assert_eq!(system.traffic_limit(), MAX_TRAFFIC_LIMIT);
    }

    #[test]
    fn test_restart_shortens_error_burst() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut system = SimulatedSystem::new();
        system.reset(FaultEvent::new(2, 40, ServiceId::Db, FaultKind::ErrorBurst, 0.8));
        for _ in 0..10 {
            system.step(&mut rng);
        }
        // remaining = 42 - 10 = 32, shrink = 19
        system.restart(ServiceId::Db);
        assert_eq!(system.active_fault().unwrap().duration(), 21);

        let state = system.service_state(ServiceId::Db).unwrap();
        assert!(state.cpu_util >= 0.18);
    }

    #[test]
    fn test_restart_floor_and_unrelated_faults() {
        let mut system = SimulatedSystem::new();
        system.reset(FaultEvent::new(0, 6, ServiceId::Api, FaultKind::ErrorBurst, 0.8));
        system.restart(ServiceId::Api);
        assert_eq!(system.active_fault().unwrap().duration(), MIN_DURATION_AFTER_RESTART);

        system.reset(FaultEvent::new(0, 30, ServiceId::Api, FaultKind::LatencySpike, 0.8));
        system.restart(ServiceId::Api);
        assert_eq!(system.active_fault().unwrap().duration(), 30);

        system.reset(FaultEvent::new(0, 30, ServiceId::Db, FaultKind::ErrorBurst, 0.8));
        system.restart(ServiceId::Api);
        assert_eq!(system.active_fault().unwrap().duration(), 30);
    }

    #[test]
    fn test_clear_cache_caps_cache_poison() {
        let mut system = SimulatedSystem::new();
        system.reset(FaultEvent::new(20, 50, ServiceId::Cache, FaultKind::CachePoison, 0.9));
        system.clear_cache();
        assert_eq!(system.active_fault().unwrap().duration(), CACHE_POISON_CAP_AFTER_CLEAR);

        system.reset(FaultEvent::new(20, 50, ServiceId::Cache, FaultKind::MemoryLeak, 0.9));
        system.clear_cache();
        assert_eq!(system.active_fault().unwrap().duration(), 50);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut system = SimulatedSystem::new();
        system.reset(quiet_fault());
        system.scale(ServiceId::Db, 3);
        system.limit_traffic(0.5);
        system.step(&mut rng);
        system.reset(quiet_fault());
        assert_eq!(system.tick(), 0);
        assert_eq!(system.traffic_limit(), 1.0);
        assert_eq!(system.service_state(ServiceId::Db).unwrap(), &ServiceState::default());
    }
}
