//! Circuit breaker guarding one upstream endpoint.
//!
//! - **Closed**: calls pass through; outcomes fill a sliding window and the
//!   circuit opens once the window's failure ratio reaches the threshold.
//! - **Open**: calls are rejected without touching the upstream until the
//!   cooldown elapses.
//! - **HalfOpen**: a limited number of trial calls go through. Enough
//!   successes close the circuit, any failure reopens it. A trial whose
//!   permit is dropped without an outcome gives its slot back.
//!
//! State is in-memory and shared by every task that fetches from the endpoint.

use crate::config::CircuitBreakerConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Returned by [`CircuitBreaker::try_acquire`] while calls are refused.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallRejected {
    pub retry_after: Duration,
}

/// Admission for one call, granted by [`CircuitBreaker::try_acquire`].
///
/// Report the outcome with [`CallPermit::success`] or [`CallPermit::failure`].
/// Dropping the permit unreported (the call was cancelled) records nothing
/// and releases the half-open trial slot it held.
#[derive(Debug)]
#[must_use = "report the call outcome through the permit"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    /// Half-open round the permit took a trial slot in.
    trial: Option<u64>,
    reported: bool,
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        if let Some(round) = self.trial {
            self.breaker.release_trial(round);
        }
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Most recent outcomes, `true` meaning failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
    /// Bumped on every Open -> HalfOpen transition.
    half_open_round: u64,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            half_open_admitted: 0,
            half_open_successes: 0,
            half_open_round: 0,
        }
    }

    fn failure_ratio(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        failures as f64 / self.window.len() as f64
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_admitted = 0;
        self.half_open_successes = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.window.clear();
        self.opened_at = None;
        self.half_open_admitted = 0;
        self.half_open_successes = 0;
    }
}

/// Thread-safe breaker for a single named endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    circuit: Mutex<Circuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            circuit: Mutex::new(Circuit::new()),
            config,
        }
    }

    /// Ask permission for one call. Moves Open to HalfOpen once the cooldown
    /// has elapsed.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CallRejected> {
        let mut circuit = self.circuit.lock();

        let trial = match circuit.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.open_cooldown);
                if elapsed < self.config.open_cooldown {
                    return Err(CallRejected {
                        retry_after: self.config.open_cooldown - elapsed,
                    });
                }
                info!(breaker = %self.name, "Circuit breaker: Open -> HalfOpen");
                circuit.state = CircuitState::HalfOpen;
                circuit.half_open_admitted = 1;
                circuit.half_open_successes = 0;
                circuit.half_open_round += 1;
                Some(circuit.half_open_round)
            }
            CircuitState::HalfOpen => {
                if circuit.half_open_admitted >= self.config.half_open_permitted_calls {
                    return Err(CallRejected {
                        retry_after: Duration::ZERO,
                    });
                }
                circuit.half_open_admitted += 1;
                Some(circuit.half_open_round)
            }
        };

        Ok(CallPermit {
            breaker: self,
            trial,
            reported: false,
        })
    }

    fn record_success(&self) {
        let mut circuit = self.circuit.lock();

        match circuit.state {
            CircuitState::Closed => self.push_outcome(&mut circuit, false),
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                debug!(
                    breaker = %self.name,
                    successes = circuit.half_open_successes,
                    required = self.config.half_open_permitted_calls,
                    "Circuit breaker: trial call succeeded"
                );
                if circuit.half_open_successes >= self.config.half_open_permitted_calls {
                    info!(breaker = %self.name, "Circuit breaker: HalfOpen -> Closed");
                    circuit.close();
                }
            }
            // A call admitted before the circuit opened finished late.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut circuit = self.circuit.lock();

        match circuit.state {
            CircuitState::Closed => {
                self.push_outcome(&mut circuit, true);
                let ratio = circuit.failure_ratio();
                if circuit.window.len() >= self.config.minimum_calls
                    && ratio >= self.config.failure_rate_threshold
                {
                    warn!(
                        breaker = %self.name,
                        failure_ratio = ratio,
                        calls = circuit.window.len(),
                        "Circuit breaker: Closed -> Open"
                    );
                    circuit.open();
                } else {
                    debug!(
                        breaker = %self.name,
                        failure_ratio = ratio,
                        calls = circuit.window.len(),
                        "Circuit breaker: failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "Circuit breaker: HalfOpen -> Open after failed trial");
                circuit.open();
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.circuit.lock().state
    }

    pub fn failure_ratio(&self) -> f64 {
        self.circuit.lock().failure_ratio()
    }

    /// Force the circuit back to Closed with an empty window.
    pub fn reset(&self) {
        info!(breaker = %self.name, "Circuit breaker: manual reset");
        self.circuit.lock().close();
    }

    fn release_trial(&self, round: u64) {
        let mut circuit = self.circuit.lock();
        if circuit.state == CircuitState::HalfOpen
            && circuit.half_open_round == round
            && circuit.half_open_admitted > 0
        {
            circuit.half_open_admitted -= 1;
            debug!(breaker = %self.name, "Circuit breaker: trial call abandoned");
        }
    }

    fn push_outcome(&self, circuit: &mut Circuit, failed: bool) {
        circuit.window.push_back(failed);
        while circuit.window.len() > self.config.sliding_window_size {
            circuit.window.pop_front();
        }
    }
}
