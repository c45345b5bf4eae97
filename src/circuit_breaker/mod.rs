pub mod breaker;
pub mod policy;
pub mod retry;
pub mod types;

pub use breaker::{Admission, BreakerSnapshot, CircuitBreaker, ProbeGuard};
pub use policy::{BackoffPolicy, BackoffSchedule};
pub use retry::RetryExecutor;
pub use types::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, FailureKind, Rejection, RetryConfig,
    MAX_COOLDOWN, MAX_COOLDOWN_SECS,
};
