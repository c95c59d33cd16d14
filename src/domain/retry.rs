use std::time::Duration;
use tokio::time::Instant;

/// Bounded-attempt policy for one call site.
///
/// `max_attempts` counts the first try. `stage_budget` caps the wall-clock time
/// spent across all attempts, and each attempt is additionally capped by
/// `attempt_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub stage_budget: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(60),
            stage_budget: Duration::from_secs(180),
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration, stage_budget: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            stage_budget,
            backoff: Duration::ZERO,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn start(&self) -> RetryBudget {
        RetryBudget {
            policy: *self,
            deadline: Instant::now() + self.stage_budget,
            used: 0,
        }
    }
}

/// Running attempt counter for one stage.
#[derive(Debug)]
pub struct RetryBudget {
    policy: RetryPolicy,
    deadline: Instant,
    used: u32,
}

impl RetryBudget {
    /// Claims the next attempt, sleeping for the backoff first when this is a
    /// retry. Returns the zero-based attempt number, or `None` once attempts or
    /// time are exhausted.
    pub async fn next_attempt(&mut self) -> Option<u32> {
        if self.used >= self.policy.max_attempts || Instant::now() >= self.deadline {
            return None;
        }
        if self.used > 0 && !self.policy.backoff.is_zero() {
            let backoff = self.policy.backoff * self.used;
            if Instant::now() + backoff >= self.deadline {
                return None;
            }
            tokio::time::sleep(backoff).await;
        }
        let attempt = self.used;
        self.used += 1;
        Some(attempt)
    }

    /// Timeout for the attempt about to run: the per-attempt cap or whatever is
    /// left of the stage budget, whichever is smaller.
    pub fn attempt_timeout(&self) -> Duration {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        remaining.min(self.policy.attempt_timeout)
    }

    pub fn attempts_used(&self) -> u32 {
        self.used
    }
}
