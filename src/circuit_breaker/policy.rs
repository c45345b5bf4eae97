use super::types::RetryConfig;
use backoff::backoff::Backoff;
use rand::Rng;
use std::time::Duration;

/// Share of the capped delay that may be added as jitter
const JITTER_FACTOR: f64 = 0.2;

/// Jittered exponential backoff: `base * 2^attempt`, capped at `max_delay`,
/// plus a uniformly random extra in `[0, 0.2 * capped]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay())
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before retry number `attempt` (0-based), with jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt);
        let jitter = rand::thread_rng().gen_range(0.0..=JITTER_FACTOR);
        capped + capped.mul_f64(jitter)
    }

    /// Largest value `delay` can return
    pub fn ceiling(&self) -> Duration {
        self.max_delay + self.max_delay.mul_f64(JITTER_FACTOR)
    }

    /// Upper bound on the total sleep across `retries` backoffs
    pub fn total_ceiling(&self, retries: u32) -> Duration {
        let mut total = Duration::ZERO;
        let mut attempt = 0;

        while attempt < retries {
            let base = self.base_delay(attempt);
            let ceiling = base.saturating_add(base.mul_f64(JITTER_FACTOR));
            if base >= self.max_delay {
                // Every remaining retry sleeps at most the capped ceiling
                let remaining = ceiling.saturating_mul(retries - attempt);
                return total.saturating_add(remaining);
            }
            total = total.saturating_add(ceiling);
            attempt += 1;
        }
        total
    }

    /// Stateful schedule starting at attempt 0
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            policy: *self,
            attempt: 0,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Walks a [`BackoffPolicy`] one retry at a time
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff for BackoffSchedule {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(1000), Duration::from_millis(10000))
    }

    #[test]
    fn test_base_delay_doubles_until_cap() {
        let policy = policy();
        assert_eq!(policy.base_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.base_delay(3), Duration::from_millis(8000));
        assert_eq!(policy.base_delay(4), Duration::from_millis(10000));
        assert_eq!(policy.base_delay(40), Duration::from_millis(10000));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(10000));
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let policy = policy();
        for attempt in 0..8 {
            let floor = policy.base_delay(attempt);
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
                assert!(delay <= floor + floor.mul_f64(JITTER_FACTOR));
                assert!(delay <= policy.ceiling());
            }
        }
    }

    #[test]
    fn test_base_delay_is_monotonic() {
        let policy = BackoffPolicy::new(Duration::from_millis(150), Duration::from_millis(5000));
        let mut previous = Duration::ZERO;
        for attempt in 0..16 {
            let current = policy.base_delay(attempt);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_total_ceiling() {
        let policy = policy();
        assert_eq!(policy.total_ceiling(0), Duration::ZERO);
        let close_to = |actual: Duration, millis: u64| {
            let expected = Duration::from_millis(millis);
            let diff = if actual > expected { actual - expected } else { expected - actual };
            assert!(diff < Duration::from_millis(1), "{actual:?} vs {expected:?}");
        };
        close_to(policy.total_ceiling(1), 1200);
        // 1.2s + 2.4s + 4.8s + 9.6s, then 12s for each capped retry
        close_to(policy.total_ceiling(4), 18_000);
        close_to(policy.total_ceiling(6), 42_000);
        assert!(policy.total_ceiling(u32::MAX) >= Duration::from_secs(86_400));
    }

    #[test]
    fn test_schedule_advances_and_resets() {
        let mut schedule = policy().schedule();
        let first = schedule.next_backoff().unwrap();
        let second = schedule.next_backoff().unwrap();
        assert!(first <= Duration::from_millis(1200));
        assert!(second >= Duration::from_millis(2000));

        schedule.reset();
        let again = schedule.next_backoff().unwrap();
        assert!(again < Duration::from_millis(2000));
    }
}
