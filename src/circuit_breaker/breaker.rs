use super::types::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, FailureKind, Rejection,
    MAX_COOLDOWN,
};
use crate::clock::Clock;
use crate::metrics;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker guarding a single upstream provider
///
/// All reads and writes of the state go through one mutex. The critical
/// sections never await, so the lock is held only for the duration of a
/// state transition.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state
    state: Mutex<State>,
    /// Provider identifier
    provider: String,
    /// Time source for cooldown comparisons
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct State {
    /// Current circuit state
    circuit_state: CircuitState,
    /// Number of consecutive failures in closed state
    consecutive_failures: u32,
    /// While set and in the future, the circuit is open
    opened_until: Option<Instant>,
    /// Last failure code, diagnostics only
    last_error_code: Option<String>,
    /// Whether the half-open probe slot is taken
    probe_in_flight: bool,
    /// Identifies the current probe so a stale guard cannot release a newer one
    probe_id: u64,
    /// Metrics
    metrics: CircuitBreakerMetrics,
}

/// Outcome of asking the breaker whether the primary may be called
#[derive(Debug)]
pub enum Admission<'a> {
    /// Circuit closed, call the primary with the normal retry budget
    Closed,
    /// The single half-open probe; resolve it through the guard
    Probe(ProbeGuard<'a>),
    /// Do not call the primary
    Rejected(Rejection),
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Time left in the cooldown window, if open
    pub open_remaining_ms: Option<u64>,
    pub last_error_code: Option<String>,
    pub probe_in_flight: bool,
    pub metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(
        provider: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let provider = provider.into();
        info!(
            provider = %provider,
            failure_threshold = config.failure_threshold,
            cooldown_secs = config.cooldown_secs,
            "Creating circuit breaker"
        );
        metrics::record_circuit_breaker_state(&provider, CircuitState::Closed.as_gauge());

        Self {
            config,
            state: Mutex::new(State {
                circuit_state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_until: None,
                last_error_code: None,
                probe_in_flight: false,
                probe_id: 0,
                metrics: CircuitBreakerMetrics::default(),
            }),
            provider,
            clock,
        }
    }

    /// Decide whether a call may reach the primary provider.
    ///
    /// The open-to-half-open transition and the claim on the probe slot
    /// happen under one lock acquisition, so at most one caller per
    /// cooldown expiry receives [`Admission::Probe`].
    pub fn try_acquire(&self) -> Admission<'_> {
        let now = self.clock.now();
        let mut state = self.lock();

        match state.circuit_state {
            CircuitState::Closed => {
                state.metrics.admitted_requests += 1;
                Admission::Closed
            }
            CircuitState::Open => match state.opened_until {
                Some(until) if now < until => {
                    state.metrics.rejected_requests += 1;
                    let remaining = until - now;
                    debug!(
                        provider = %self.provider,
                        remaining_ms = remaining.as_millis() as u64,
                        "Circuit breaker open, routing to fallback"
                    );
                    Admission::Rejected(Rejection::Open { remaining })
                }
                _ => {
                    self.transition_to_half_open(&mut state);
                    Admission::Probe(self.claim_probe(&mut state))
                }
            },
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    state.metrics.rejected_requests += 1;
                    debug!(
                        provider = %self.provider,
                        "Half-open probe already in flight, routing to fallback"
                    );
                    Admission::Rejected(Rejection::ProbeInFlight)
                } else {
                    // Previous probe was abandoned before it resolved
                    Admission::Probe(self.claim_probe(&mut state))
                }
            }
        }
    }

    /// Record a successful primary call admitted while closed
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.metrics.successful_requests += 1;

        if state.circuit_state == CircuitState::Closed {
            state.consecutive_failures = 0;
        } else {
            debug!(
                provider = %self.provider,
                state = %state.circuit_state,
                "Late success outside closed state, circuit unchanged"
            );
        }
    }

    /// Record a failed primary call admitted while closed
    pub fn record_failure(&self, kind: FailureKind, code: Option<&str>) {
        let mut state = self.lock();
        Self::count_failure(&mut state, kind, code);

        match state.circuit_state {
            CircuitState::Closed => {
                let failures = state.consecutive_failures + 1;

                if kind.is_disqualifying() {
                    warn!(
                        provider = %self.provider,
                        code = code.unwrap_or("unknown"),
                        "Disqualifying failure, opening circuit immediately"
                    );
                    self.transition_to_open(&mut state);
                } else if failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut state);
                } else {
                    state.consecutive_failures = failures;
                    debug!(
                        provider = %self.provider,
                        consecutive_failures = failures,
                        threshold = self.config.failure_threshold,
                        "Primary call failed in closed state"
                    );
                }
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                // Counters belong to the probe once the circuit has left closed
                debug!(
                    provider = %self.provider,
                    state = %state.circuit_state,
                    "Late failure outside closed state, circuit unchanged"
                );
            }
        }
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.lock().circuit_state
    }

    /// Get the consecutive failure count
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Consistent view of every field, taken under one lock
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let state = self.lock();
        BreakerSnapshot {
            state: state.circuit_state,
            consecutive_failures: state.consecutive_failures,
            open_remaining_ms: state
                .opened_until
                .map(|until| until.saturating_duration_since(now).as_millis() as u64),
            last_error_code: state.last_error_code.clone(),
            probe_in_flight: state.probe_in_flight,
            metrics: state.metrics.clone(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn cooldown(&self) -> Duration {
        self.config.cooldown().min(MAX_COOLDOWN)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every transition leaves the state consistent, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim_probe(&self, state: &mut State) -> ProbeGuard<'_> {
        state.probe_in_flight = true;
        state.probe_id += 1;
        state.metrics.admitted_requests += 1;
        debug!(
            provider = %self.provider,
            probe_id = state.probe_id,
            "Allowing half-open probe request"
        );

        ProbeGuard {
            breaker: self,
            probe_id: state.probe_id,
            resolved: false,
        }
    }

    fn resolve_probe(&self, probe_id: u64, outcome: Result<(), (FailureKind, Option<&str>)>) {
        let mut state = self.lock();
        if state.circuit_state != CircuitState::HalfOpen || state.probe_id != probe_id {
            return;
        }
        state.probe_in_flight = false;

        match outcome {
            Ok(()) => {
                state.metrics.successful_requests += 1;
                self.transition_to_closed(&mut state);
            }
            Err((kind, code)) => {
                Self::count_failure(&mut state, kind, code);
                warn!(
                    provider = %self.provider,
                    code = code.unwrap_or("unknown"),
                    "Half-open probe request failed, reopening circuit"
                );
                self.transition_to_open(&mut state);
            }
        }
    }

    fn abandon_probe(&self, probe_id: u64) {
        let mut state = self.lock();
        if state.circuit_state == CircuitState::HalfOpen
            && state.probe_in_flight
            && state.probe_id == probe_id
        {
            state.probe_in_flight = false;
            debug!(
                provider = %self.provider,
                probe_id,
                "Half-open probe abandoned, slot released"
            );
        }
    }

    fn count_failure(state: &mut State, kind: FailureKind, code: Option<&str>) {
        state.metrics.failed_requests += 1;
        match kind {
            FailureKind::Timeout => state.metrics.timeout_count += 1,
            FailureKind::Disqualifying => state.metrics.disqualifying_failures += 1,
            FailureKind::Transient => {}
        }
        if let Some(code) = code {
            state.last_error_code = Some(code.to_string());
        }
    }

    /// Transition to open state
    fn transition_to_open(&self, state: &mut State) {
        let from = state.circuit_state;
        let cooldown = self.cooldown();

        warn!(
            provider = %self.provider,
            from = %from,
            cooldown_secs = cooldown.as_secs(),
            last_error = state.last_error_code.as_deref().unwrap_or("unknown"),
            "Circuit breaker opening"
        );

        let now = self.clock.now();
        state.circuit_state = CircuitState::Open;
        state.opened_until = Some(now.checked_add(cooldown).unwrap_or(now));
        state.consecutive_failures = self.config.failure_threshold;
        state.probe_in_flight = false;
        state.metrics.circuit_opened_count += 1;
        self.publish_transition(from, CircuitState::Open);
    }

    /// Transition to half-open state
    fn transition_to_half_open(&self, state: &mut State) {
        info!(
            provider = %self.provider,
            cooldown = ?self.cooldown(),
            "Circuit breaker transitioning to half-open"
        );

        state.circuit_state = CircuitState::HalfOpen;
        state.opened_until = None;
        state.probe_in_flight = false;
        state.metrics.circuit_half_opened_count += 1;
        self.publish_transition(CircuitState::Open, CircuitState::HalfOpen);
    }

    /// Transition to closed state
    fn transition_to_closed(&self, state: &mut State) {
        info!(provider = %self.provider, "Circuit breaker closing");

        let from = state.circuit_state;
        state.circuit_state = CircuitState::Closed;
        state.opened_until = None;
        state.consecutive_failures = 0;
        state.probe_in_flight = false;
        state.metrics.circuit_closed_count += 1;
        self.publish_transition(from, CircuitState::Closed);
    }

    fn publish_transition(&self, from: CircuitState, to: CircuitState) {
        metrics::record_circuit_breaker_transition(
            &self.provider,
            &from.to_string(),
            &to.to_string(),
        );
        metrics::record_circuit_breaker_state(&self.provider, to.as_gauge());
    }
}

/// Holds the half-open probe slot until the probe is resolved.
///
/// Dropping an unresolved guard releases the slot and leaves the circuit
/// half-open, so a cancelled probe cannot wedge the breaker.
#[derive(Debug)]
#[must_use = "an unresolved probe is treated as abandoned"]
pub struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    probe_id: u64,
    resolved: bool,
}

impl ProbeGuard<'_> {
    /// Probe succeeded, close the circuit
    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.resolve_probe(self.probe_id, Ok(()));
    }

    /// Probe failed, reopen the circuit with a fresh cooldown
    pub fn fail(mut self, kind: FailureKind, code: Option<&str>) {
        self.resolved = true;
        self.breaker.resolve_probe(self.probe_id, Err((kind, code)));
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.abandon_probe(self.probe_id);
        }
    }
}
