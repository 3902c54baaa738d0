//! Bounded retry for platform calls.
//!
//! Retries DNS failures and the 5xx sentinel after a fixed pause until an overall
//! deadline measured from the first attempt. Other errors return immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PlatformError, Result};

fn default_timeout_secs() -> u64 {
    60
}

fn default_pause_secs() -> u64 {
    3
}

/// Retry budget for platform calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Overall deadline in seconds, from the first attempt (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between attempts in seconds (default: 3)
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(skip)]
    overrides: Option<(Duration, Duration)>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            pause_secs: default_pause_secs(),
            overrides: None,
        }
    }
}

impl RetryConfig {
    /// Sub-second budget, mostly for tests.
    pub fn with_durations(timeout: Duration, pause: Duration) -> Self {
        Self {
            timeout_secs: timeout.as_secs(),
            pause_secs: pause.as_secs(),
            overrides: Some((timeout, pause)),
        }
    }

    /// Overall deadline.
    pub fn timeout(&self) -> Duration {
        self.overrides
            .map(|(t, _)| t)
            .unwrap_or(Duration::from_secs(self.timeout_secs))
    }

    /// Pause between attempts.
    pub fn pause(&self) -> Duration {
        self.overrides
            .map(|(_, p)| p)
            .unwrap_or(Duration::from_secs(self.pause_secs))
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, the
/// deadline passes, or `cancel` fires.
///
/// With N retryable failures before success this succeeds iff `N * pause < timeout`;
/// otherwise it returns [`PlatformError::Timeout`] wrapping the last error once
/// `timeout` has elapsed.
pub async fn do_with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let timeout = config.timeout();
    let pause = config.pause();
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
            result = operation() => result,
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        let remaining = timeout.saturating_sub(start.elapsed());
        let wait = remaining.min(pause);
        debug!(attempt, error = %err, wait_ms = wait.as_millis() as u64, "retrying platform call");
        tokio::select! {
            _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
        if remaining <= pause {
            return Err(PlatformError::Timeout {
                elapsed: start.elapsed(),
                last: Box::new(err),
            });
        }
    }
}
