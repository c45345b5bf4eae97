use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, the primary provider is eligible
    Closed,
    /// Circuit is open, every call goes to the fallback until the cooldown elapses
    Open,
    /// Cooldown elapsed, a single probe call to the primary is permitted
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used by the state gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// How a failed primary call counts against the circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Counts toward the failure threshold
    Transient,
    /// Transient failure caused by an attempt exceeding its deadline
    Timeout,
    /// Known to persist for the rest of a cooldown window; opens the circuit immediately
    Disqualifying,
}

impl FailureKind {
    pub fn is_disqualifying(&self) -> bool {
        matches!(self, FailureKind::Disqualifying)
    }
}

/// Why a call was not admitted to the primary provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Circuit is open; `remaining` is the time left in the cooldown window
    Open { remaining: Duration },
    /// Circuit is half-open and the single probe is already in flight
    ProbeInFlight,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Open { .. } => "circuit_open",
            Rejection::ProbeInFlight => "probe_in_flight",
        }
    }
}

/// Longest cooldown the breaker will honor
pub const MAX_COOLDOWN_SECS: u64 = 86_400;
pub const MAX_COOLDOWN: Duration = Duration::from_secs(MAX_COOLDOWN_SECS);

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Duration to stay open before a probe is allowed
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Retry configuration for calls to the primary provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of tries per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on the pre-jitter delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Calls admitted to the primary provider (including probes)
    pub admitted_requests: u64,
    /// Number of successful primary calls
    pub successful_requests: u64,
    /// Number of failed primary calls
    pub failed_requests: u64,
    /// Failed calls that were classified as disqualifying
    pub disqualifying_failures: u64,
    /// Calls short-circuited to the fallback
    pub rejected_requests: u64,
    /// Number of timeouts
    pub timeout_count: u64,
    /// Number of times circuit opened
    pub circuit_opened_count: u64,
    /// Number of times circuit closed
    pub circuit_closed_count: u64,
    /// Number of times circuit half-opened
    pub circuit_half_opened_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "Closed");
        assert_eq!(CircuitState::Open.to_string(), "Open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HalfOpen");
    }

    #[test]
    fn test_circuit_state_serializes_snake_case() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.base_delay(), Duration::from_millis(1000));
        assert_eq!(config.max_delay(), Duration::from_millis(10000));
    }

    #[test]
    fn test_rejection_reason() {
        let open = Rejection::Open {
            remaining: Duration::from_secs(5),
        };
        assert_eq!(open.reason(), "circuit_open");
        assert_eq!(Rejection::ProbeInFlight.reason(), "probe_in_flight");
        assert!(FailureKind::Disqualifying.is_disqualifying());
        assert!(!FailureKind::Timeout.is_disqualifying());
    }
}
