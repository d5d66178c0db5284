//! Fault injection
//!
//! One fault is sampled per episode. While active it multiplies the
//! target service's latency, error rate, CPU and memory by per-kind
//! coefficients scaled with severity.

use crate::models::ServiceId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shortest duration a restart can shrink a fault to
pub const MIN_DURATION_AFTER_RESTART: u32 = 5;

/// Fraction of the remaining fault window removed by a restart
pub const RESTART_SHRINK_FRACTION: f64 = 0.6;

/// Total duration cap applied to a cache-poison fault when the cache is cleared
pub const CACHE_POISON_CAP_AFTER_CLEAR: u32 = 8;

/// Kinds of injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    LatencySpike,
    ErrorBurst,
    CpuSaturation,
    MemoryLeak,
    CachePoison,
}

impl FaultKind {
    pub const ALL: [FaultKind; 5] = [
        FaultKind::LatencySpike,
        FaultKind::ErrorBurst,
        FaultKind::CpuSaturation,
        FaultKind::MemoryLeak,
        FaultKind::CachePoison,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::LatencySpike => "latency_spike",
            FaultKind::ErrorBurst => "error_burst",
            FaultKind::CpuSaturation => "cpu_saturation",
            FaultKind::MemoryLeak => "memory_leak",
            FaultKind::CachePoison => "cache_poison",
        }
    }

    /// Whether a restart of the target service shortens this fault
    pub fn shortened_by_restart(&self) -> bool {
        matches!(self, FaultKind::ErrorBurst | FaultKind::CachePoison)
    }

    /// Multipliers for a fault of this kind at the given severity
    fn multipliers(&self, sev: f64) -> Multipliers {
        let (latency, error, cpu, mem) = match self {
            FaultKind::LatencySpike => (1.0 + 3.5 * sev, 1.0 + 0.2 * sev, 1.0 + 0.1 * sev, 1.0),
            FaultKind::ErrorBurst => (1.0 + 0.6 * sev, 1.0 + 6.0 * sev, 1.0 + 0.2 * sev, 1.0),
            FaultKind::CpuSaturation => (1.0 + 1.8 * sev, 1.0 + 1.0 * sev, 1.0 + 2.5 * sev, 1.0),
            FaultKind::MemoryLeak => (
                1.0 + 1.0 * sev,
                1.0 + 0.7 * sev,
                1.0 + 0.3 * sev,
                1.0 + 2.5 * sev,
            ),
            FaultKind::CachePoison => (1.0 + 2.0 * sev, 1.0 + 1.5 * sev, 1.0 + 0.2 * sev, 1.0),
        };
        Multipliers {
            latency,
            error,
            cpu,
            mem,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multipliers applied to (latency, error, cpu, mem) of one service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    pub latency: f64,
    pub error: f64,
    pub cpu: f64,
    pub mem: f64,
}

impl Multipliers {
    pub const IDENTITY: Multipliers = Multipliers {
        latency: 1.0,
        error: 1.0,
        cpu: 1.0,
        mem: 1.0,
    };
}

impl Default for Multipliers {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// The single fault injected into an episode.
///
/// Fields are fixed at creation except `duration`, which remediation may
/// reduce through [`FaultEvent::shorten_duration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultEvent {
    start_tick: u32,
    duration: u32,
    service: ServiceId,
    kind: FaultKind,
    severity: f64,
}

impl FaultEvent {
    pub fn new(
        start_tick: u32,
        duration: u32,
        service: ServiceId,
        kind: FaultKind,
        severity: f64,
    ) -> Self {
        Self {
            start_tick,
            duration,
            service,
            kind,
            severity: severity.clamp(0.0, 1.0),
        }
    }

    pub fn start_tick(&self) -> u32 {
        self.start_tick
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    /// Exclusive end of the active window
    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.duration
    }

    /// Active on the half-open window `[start_tick, end_tick)`
    pub fn is_active(&self, tick: u32) -> bool {
        self.start_tick <= tick && tick < self.end_tick()
    }

    /// Ticks left in the active window as seen from `tick`
    pub fn remaining(&self, tick: u32) -> u32 {
        self.end_tick().saturating_sub(tick)
    }

    /// Reduce the total duration to `new_duration`. Never extends the fault.
    pub fn shorten_duration(&mut self, new_duration: u32) {
        self.duration = self.duration.min(new_duration);
    }

    /// Multipliers this fault applies to `service` at `tick`
    pub fn multipliers_for(&self, service: ServiceId, tick: u32) -> Multipliers {
        if self.service != service || !self.is_active(tick) {
            return Multipliers::IDENTITY;
        }
        self.kind.multipliers(self.severity)
    }
}

/// Sample the episode's fault.
///
/// The start leaves the detector a stretch of baseline telemetry, and the
/// duration is long enough for the agent to react.
pub fn sample_fault<R: Rng>(rng: &mut R, steps: u32) -> FaultEvent {
    let service = ServiceId::ALL[rng.random_range(0..ServiceId::ALL.len())];
    let kind = FaultKind::ALL[rng.random_range(0..FaultKind::ALL.len())];

    let start_lo = (steps / 6).max(10);
    let start_hi = (steps / 2).max(20);
    let start_tick = rng.random_range(start_lo..=start_hi);

    let duration = rng.random_range(steps / 12..=steps / 4);
    let severity = rng.random_range(0.4..=1.0);

    FaultEvent::new(start_tick, duration, service, kind, severity)
}
