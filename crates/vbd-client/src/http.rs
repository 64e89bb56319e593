//! Retry loop shared by the HTTP clients.

use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use vbd_core::{AppError, HttpConfig};

/// Sends a request, retrying transient failures with backoff.
///
/// Retries on:
/// - Connection errors and timeouts
/// - Server errors (5xx)
/// - Rate limiting (429), with exponential backoff
///
/// Any other status is returned to the caller as-is. A 5xx that persists
/// through every attempt is returned too, so callers can read its body.
pub(crate) async fn send_with_retry<F>(
    config: &HttpConfig,
    target: &str,
    build: F,
) -> Result<Response, AppError>
where
    F: Fn() -> RequestBuilder,
{
    let max_retries = config.max_retries.max(1);
    let base_ms = config.retry_base_delay.as_millis() as u64;
    let mut last_error = AppError::Generic("No attempts made".to_string());

    for attempt in 1..=max_retries {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();

                if status == StatusCode::TOO_MANY_REQUESTS {
                    last_error = AppError::RateLimitExceeded;
                    if attempt < max_retries {
                        warn!("Rate limited by {} (attempt {})", target, attempt);
                        sleep(Duration::from_millis(base_ms * 2_u64.pow(attempt))).await;
                        continue;
                    }
                    return Err(last_error);
                }

                if status.is_server_error() && attempt < max_retries {
                    warn!(
                        "HTTP {} from {} (attempt {}), retrying",
                        status.as_u16(),
                        target,
                        attempt
                    );
                    sleep(Duration::from_millis(base_ms * attempt as u64)).await;
                    continue;
                }

                return Ok(resp);
            }
            Err(e) => {
                if e.is_timeout() {
                    last_error = AppError::Timeout(config.timeout.as_secs());
                } else if e.is_connect() {
                    last_error = AppError::NetworkError(format!("Connection failed: {}", e));
                } else {
                    last_error = AppError::ClientError(e.to_string());
                }

                if attempt < max_retries && (e.is_timeout() || e.is_connect()) {
                    sleep(Duration::from_millis(base_ms * attempt as u64)).await;
                    continue;
                }
                return Err(last_error);
            }
        }
    }

    Err(last_error)
}
