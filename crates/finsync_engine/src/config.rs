//! Configuration for the sync engine.

use crate::reconciler::DEFAULT_LEASE_TTL;
use finsync_store::SyncInterval;
use std::time::Duration;

/// Configuration for the engine and its remote gateway.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the remote service.
    pub server_url: String,
    /// Retry policy for every remote call.
    pub retry: RetryPolicy,
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
    /// Cadence used when the preference ledger cannot be read.
    pub fallback_interval: SyncInterval,
    /// Capacity of the pass-outcome broadcast channel.
    pub outcome_buffer: usize,
    /// How long a pass lease lasts without renewal.
    pub lease_ttl: Duration,
}

impl EngineConfig {
    /// Creates a new configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            fallback_interval: SyncInterval::default(),
            outcome_buffer: 16,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the pass lease lifetime.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Sets the fallback cadence.
    pub fn with_fallback_interval(mut self, interval: SyncInterval) -> Self {
        self.fallback_interval = interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Bounded retry with a fixed backoff.
///
/// No jitter and no exponential growth: attempt `n > 0` always waits
/// `backoff` after attempt `n - 1` failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait between consecutive attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the default 2 second backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_secs(2),
        }
    }

    /// Creates a policy with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Sets the backoff.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the given attempt (0-indexed).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.backoff
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
