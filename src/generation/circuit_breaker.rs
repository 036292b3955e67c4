//! Circuit breaker guarding language model calls

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected until the reset timeout passes
    Open,
    /// One trial call is deciding whether to close again
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failure_count: usize,
    pub last_failure: Option<Instant>,
}

#[derive(Debug)]
struct Circuit {
    state: BreakerState,
    failure_count: usize,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
}

impl Circuit {
    fn closed() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            opened_at: None,
            trial_started: None,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trial_started = None;
    }
}

/// Breaker for one upstream.
///
/// After `failure_threshold` consecutive failures calls are refused until
/// `reset_timeout` has passed. The first caller after that becomes the only
/// trial call; everyone else is refused until it reports back or, if it was
/// cancelled, until another `reset_timeout` passes. A successful trial closes
/// the circuit, a failed one reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    circuit: Mutex<Circuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuit: Mutex::new(Circuit::closed()),
            config,
        }
    }

    // Bookkeeping stays usable even if a holder panicked
    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask permission for one call; `false` means fail fast
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut circuit = self.circuit();
        let waited = match circuit.state {
            BreakerState::Closed => return true,
            BreakerState::HalfOpen => circuit.trial_started,
            BreakerState::Open => circuit.opened_at,
        };

        match waited {
            Some(since) if now.duration_since(since) < self.config.reset_timeout => false,
            _ => {
                circuit.state = BreakerState::HalfOpen;
                circuit.trial_started = Some(now);
                true
            }
        }
    }

    pub fn record_success(&self) {
        *self.circuit() = Circuit::closed();
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut circuit = self.circuit();
        circuit.failure_count += 1;
        circuit.last_failure = Some(now);

        if circuit.state == BreakerState::HalfOpen || circuit.failure_count >= self.config.failure_threshold {
            circuit.open(now);
        }
    }

    pub fn state(&self) -> BreakerState {
        self.circuit().state
    }

    pub fn stats(&self) -> BreakerStats {
        let circuit = self.circuit();
        BreakerStats {
            state: circuit.state,
            failure_count: circuit.failure_count,
            last_failure: circuit.last_failure,
        }
    }

    pub fn reset(&self) {
        *self.circuit() = Circuit::closed();
    }
}
