use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// When to stop calling the vision model and when to probe it again
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    /// Consecutive upstream failures that open the circuit
    pub failure_threshold: u32,
    /// Cool-down before a probe request is let through
    pub cool_down: Duration,
    /// Probe successes needed to close again
    pub probe_successes: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            probe_successes: 1,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

/// Stops hammering the vision model while it is failing.
///
/// Cloning shares the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
    phase: Arc<Mutex<Phase>>,
    policy: BreakerPolicy,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_policy(BreakerPolicy::default())
    }

    pub fn with_policy(policy: BreakerPolicy) -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
            policy,
        }
    }

    /// Whether a request may go upstream now. Moves Open → HalfOpen once the cool-down passed.
    pub fn allow_request(&self) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { since } if since.elapsed() >= self.policy.cool_down => {
                info!("Cool-down elapsed, probing vision model");
                *phase = Phase::HalfOpen { successes: 0 };
                true
            }
            Phase::Open { .. } => false,
        }
    }

    pub fn record_success(&self) {
        let mut phase = self.phase.lock();
        *phase = match *phase {
            Phase::HalfOpen { successes } if successes + 1 < self.policy.probe_successes => {
                Phase::HalfOpen { successes: successes + 1 }
            }
            Phase::HalfOpen { .. } => {
                info!("Vision model recovered, closing circuit");
                Phase::Closed { failures: 0 }
            }
            _ => Phase::Closed { failures: 0 },
        };
    }

    /// Record an upstream failure. Returns true if this call opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { failures } if failures + 1 >= self.policy.failure_threshold => {
                warn!("{} consecutive upstream failures, opening circuit", failures + 1);
                *phase = Phase::Open { since: Instant::now() };
                true
            }
            Phase::Closed { failures } => {
                *phase = Phase::Closed { failures: failures + 1 };
                false
            }
            Phase::HalfOpen { .. } => {
                warn!("Probe request failed, reopening circuit");
                *phase = Phase::Open { since: Instant::now() };
                true
            }
            Phase::Open { .. } => {
                *phase = Phase::Open { since: Instant::now() };
                false
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase.lock() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Open immediately, e.g. when an operator knows the upstream is down
    pub fn force_open(&self) {
        *self.phase.lock() = Phase::Open { since: Instant::now() };
    }

    pub fn reset(&self) {
        *self.phase.lock() = Phase::Closed { failures: 0 };
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_policy() -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: 2,
            cool_down: Duration::from_millis(50),
            probe_successes: 2,
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::with_policy(quick_policy());

        assert!(!breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::with_policy(quick_policy());

        breaker.record_failure();
        breaker.record_success();
        assert!(!breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_probe_cycle() {
        let breaker = CircuitBreaker::with_policy(quick_policy());
        breaker.force_open();

        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = CircuitBreaker::with_policy(quick_policy());
        breaker.force_open();

        std::thread::sleep(Duration::from_millis(80));
        assert!(breaker.allow_request());
        assert!(breaker.record_failure());
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
