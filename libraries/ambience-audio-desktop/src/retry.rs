//! Bounded retry for transient device failures

use crate::error::{AudioError, Result};
use ambience_core::ModuleConfig;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ModuleConfig::default())
    }
}

impl From<&ModuleConfig> for RetryPolicy {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            attempts: config.device_retry_attempts,
            delay: config.device_retry_delay(),
        }
    }
}

/// Run `op`, retrying transient device failures with a fixed delay
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                if let AudioError::DeviceAcquisition { kind, message } = &err {
                    warn!(attempt, attempts, ?kind, %message, "{what} failed, retrying");
                }
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
