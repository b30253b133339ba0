use std::future::Future;
use std::time::Duration;

use tracing::warn;

use democrm_runtime_config::RetrySettings;

use crate::error::ClientError;

/// Retry policy for read-only requests.
///
/// Only transport failures are retried. Any HTTP response, error or not, is
/// returned as is. Writes never go through here.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub read_retries: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            read_retries: 1,
            delay: Duration::from_millis(250),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            read_retries: s.read_retries,
            delay: Duration::from_millis(s.delay_ms),
        }
    }
}

/// Run `op`, retrying on [`ClientError::NetworkUnavailable`] up to
/// `config.read_retries` times.
pub async fn retry_read<T, F, Fut>(config: &RetryConfig, what: &str, mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = config.read_retries + 1;
    let mut attempt = 1;

    loop {
        match op().await {
            Err(ClientError::NetworkUnavailable(e)) if attempt < max_attempts => {
                warn!(
                    "{what} attempt {attempt}/{max_attempts} failed ({e}), retrying in {}ms…",
                    config.delay.as_millis(),
                );
                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
