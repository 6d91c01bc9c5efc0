use std::time::Duration;

/// Configures attempt budget, backoff and timeout for one logical call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per logical call, the first one included.
    ///
    /// `0` behaves like `1`: a call always makes one attempt.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub backoff_unit_ms: u64,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Whether attempts are bound to `timeout_ms`.
    ///
    /// When `false`, attempts run without a timeout guard.
    pub supports_abort_signal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit_ms: 1_000,
            timeout_ms: 10_000,
            supports_abort_signal: true,
        }
    }
}

impl RetryPolicy {
    /// Number of attempts a logical call may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait applied after a retryable failure of `attempt` (1-based).
    ///
    /// `unit * 2^(attempt - 1)`, exponent capped at 16.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let multiplier = 1u64 << exp;
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(multiplier))
    }

    /// Timeout guard for one attempt, if the policy allows one.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.supports_abort_signal
            .then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;

    #[test]
    fn defaults_match_chat_client() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff_unit_ms, 1_000);
        assert_eq!(policy.timeout_ms, 10_000);
        assert!(policy.supports_abort_signal);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(4_000));
    }

    #[test]
    fn backoff_exponent_is_capped() {
        let policy = RetryPolicy {
            backoff_unit_ms: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for(17), Duration::from_millis(1 << 16));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_millis(1 << 16));
    }

    #[test]
    fn zero_budget_still_allows_one_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn timeout_guard_follows_capability() {
        let mut policy = RetryPolicy::default();
        assert_eq!(policy.attempt_timeout(), Some(Duration::from_secs(10)));
        policy.supports_abort_signal = false;
        assert_eq!(policy.attempt_timeout(), None);
    }
}
