use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exponential backoff between attempts of the same request
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        let capped_delay = exponential_delay.min(self.max_ms);
        let jitter = if self.jitter_percent > 0 {
            rand::thread_rng().gen_range(0..capped_delay * self.jitter_percent / 100 + 1)
        } else {
            0
        };
        Duration::from_millis(capped_delay + jitter)
    }
}

/// Randomized pause between consecutive requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourtesyDelay {
    min_ms: u64,
    max_ms: u64,
}

impl CourtesyDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms: max_ms.max(min_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleeps for a sampled delay; returns false if cancelled first
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let delay = self.sample();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tracing::debug!("Waiting {:?} before next request", delay);
        sleep_or_cancel(delay, cancel).await
    }
}

/// Sleeps for `duration` unless the token fires first
///
/// Returns true if the full duration elapsed.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}
