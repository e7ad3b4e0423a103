//! Retry policy and the per-request retry context.
//!
//! The policy is static configuration; the context is the transient
//! state of one logical request (how many retries it has used). The
//! context is created when the request starts and dropped when it
//! resolves, success or not, so nothing leaks between requests.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (excluding the initial attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `retry` (0-based).
    ///
    /// `base_delay * 2^retry`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Transient retry state of a single logical request.
#[derive(Debug, Clone)]
pub struct RetryContext {
    policy: RetryPolicy,
    retries: u32,
    waited: Duration,
}

impl RetryContext {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retries: 0,
            waited: Duration::ZERO,
        }
    }

    /// Attempts made so far, counting the initial one.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Total backoff handed out so far.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Claims the next retry.
    ///
    /// Returns the delay to wait before it, or `None` once the budget
    /// is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        let delay = self.policy.delay_for(self.retries);
        self.retries += 1;
        self.waited += delay;
        Some(delay)
    }
}
