// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff.
//!
//! # Example
//!
//! ```
//! use sync_store::RetryConfig;
//! use std::time::Duration;
//!
//! // Startup: fail fast on a bad URL
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//! assert_eq!(startup.delay_for(1), Duration::from_millis(200));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff policy. `max_retries` counts total attempts; `None` retries forever.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Five attempts, about five seconds in total. Surfaces a misconfigured
    /// `sql_url` quickly instead of hanging the caller.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before the retry following failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt {
            delay = delay.mul_f64(self.factor).min(self.max_delay);
        }
        delay
    }
}

pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if config.max_retries.is_some_and(|max| attempts >= max) {
                    warn!(operation = operation_name, attempts, error = %err, "Giving up");
                    return Err(err);
                }

                let delay = config.delay_for(attempts);
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    error = %err,
                    "Operation failed, retrying in {:?}",
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}
