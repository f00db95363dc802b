//! Retry policy and per-call deadlines.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_OPERATION_DEADLINE, DEFAULT_RETRY_INTERVAL};

/// Upper bound on connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaxAttempts {
    /// At most this many attempts.
    Limited(u32),
    /// No attempt ceiling. The operation deadline still applies.
    Unlimited,
}

impl MaxAttempts {
    /// Check if another attempt is allowed after `made` attempts.
    pub fn allows(self, made: u32) -> bool {
        match self {
            MaxAttempts::Limited(max) => made < max,
            MaxAttempts::Unlimited => true,
        }
    }

    /// Check if this is the unlimited sentinel.
    pub fn is_unlimited(self) -> bool {
        matches!(self, MaxAttempts::Unlimited)
    }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        MaxAttempts::Limited(DEFAULT_MAX_ATTEMPTS)
    }
}

impl From<u32> for MaxAttempts {
    fn from(max: u32) -> Self {
        MaxAttempts::Limited(max)
    }
}

impl fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxAttempts::Limited(max) => write!(f, "{max}"),
            MaxAttempts::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// How many connection attempts are made, how far apart, and how long a
/// single blocking call may take.
///
/// The retry interval is a fixed pause, not an exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling for connect and reconnect loops.
    pub max_attempts: MaxAttempts,
    /// Pause between consecutive attempts.
    pub retry_interval: Duration,
    /// Bound on one `open`/`read`/`write` call, measured from its start.
    pub operation_deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MaxAttempts::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            operation_deadline: DEFAULT_OPERATION_DEADLINE,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit parameters.
    pub fn new(
        max_attempts: impl Into<MaxAttempts>,
        retry_interval: Duration,
        operation_deadline: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.into(),
            retry_interval,
            operation_deadline,
        }
    }

    /// Set the attempt ceiling.
    pub fn with_max_attempts(mut self, max_attempts: impl Into<MaxAttempts>) -> Self {
        self.max_attempts = max_attempts.into();
        self
    }

    /// Remove the attempt ceiling.
    pub fn unlimited(mut self) -> Self {
        self.max_attempts = MaxAttempts::Unlimited;
        self
    }

    /// Set the pause between attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the per-call deadline.
    pub fn with_operation_deadline(mut self, deadline: Duration) -> Self {
        self.operation_deadline = deadline;
        self
    }

    /// Start a deadline for a call beginning now.
    pub fn start_deadline(&self) -> Deadline {
        Deadline::after(self.operation_deadline)
    }
}

/// A started operation budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a budget of `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Total budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time spent since the deadline started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, or `None` once the budget is spent.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .checked_sub(self.elapsed())
            .filter(|left| !left.is_zero())
    }

    /// Check if the budget is spent.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_attempts() {
        let max = MaxAttempts::Limited(3);
        assert!(max.allows(0));
        assert!(max.allows(2));
        assert!(!max.allows(3));
        assert!(!max.allows(4));
    }

    #[test]
    fn test_zero_attempts_allows_nothing() {
        assert!(!MaxAttempts::Limited(0).allows(0));
    }

    #[test]
    fn test_unlimited_attempts() {
        let max = MaxAttempts::Unlimited;
        assert!(max.is_unlimited());
        assert!(max.allows(u32::MAX));
        assert_eq!(max.to_string(), "unlimited");
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, MaxAttempts::Limited(5));
        assert_eq!(policy.retry_interval, Duration::from_millis(100));
        assert_eq!(policy.operation_deadline, Duration::from_secs(1));
    }

    #[test]
    fn test_policy_builder() {
        let policy = RetryPolicy::default()
            .unlimited()
            .with_retry_interval(Duration::from_millis(20))
            .with_operation_deadline(Duration::from_secs(3));

        assert!(policy.max_attempts.is_unlimited());
        assert_eq!(policy.retry_interval, Duration::from_millis(20));
        assert_eq!(policy.operation_deadline, Duration::from_secs(3));

        let policy = policy.with_max_attempts(7u32);
        assert_eq!(policy.max_attempts, MaxAttempts::Limited(7));
    }

    #[test]
    fn test_deadline_remaining() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let left = deadline.remaining().unwrap();
        assert!(left <= Duration::from_secs(60));
        assert!(!deadline.is_expired());
    }

    #[test]
    fn test_zero_deadline_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(deadline.is_expired());
        assert!(deadline.elapsed() >= Duration::from_millis(20));
    }
}
