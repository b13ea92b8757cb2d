//! Fixed-delay retry for transient failures while bootstrapping external clients.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, warn};

use crate::config::duration::deserialize_duration;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(deserialize_with = "deserialize_duration", default = "default_delay")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_delay(),
        }
    }
}

const fn default_attempts() -> u32 {
    3
}
const fn default_delay() -> Duration {
    Duration::from_secs(2)
}

/// Runs `operation` until it succeeds or `config.attempts` attempts have failed.
/// The last error is returned unchanged.
pub async fn retry_fixed<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                error!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "Operation failed after {} attempts",
                    attempts
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "Operation failed, retrying in {} seconds",
                    config.delay.as_secs()
                );
                tokio::time::sleep(config.delay).await;
            }
        }
    }
}
