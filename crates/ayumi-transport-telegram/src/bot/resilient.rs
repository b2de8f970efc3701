//! Resilient Telegram API calls.
//!
//! Transient network failures are retried with exponential backoff and
//! jitter. Rejections by the Bot API are returned on the first attempt:
//! repeating them would only produce the same answer.
//!
//! # Usage
//!
//! ```ignore
//! use ayumi_transport_telegram::bot::resilient::retry_telegram_operation;
//!
//! let msg = retry_telegram_operation(|| {
//!     let request = bot.send_message(chat_id, "Hello!");
//!     async move { request.await }
//! })
//! .await?;
//! ```

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use std::future::Future;
use std::time::Duration;
use teloxide::RequestError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Whether a failed request is worth repeating.
#[must_use]
pub const fn is_transient(error: &RequestError) -> bool {
    matches!(error, RequestError::Network(_) | RequestError::Io(_))
}

/// Run a Telegram API call, retrying transient network failures.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    retry_when(operation, is_transient).await
}

async fn retry_when<F, Fut, T, E>(operation: F, retryable: fn(&E) -> bool) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(TELEGRAM_API_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, retryable)
        .await
        .map_err(|e| {
            if retryable(&e) {
                warn!(
                    "Telegram API operation failed after {} retries: {}",
                    TELEGRAM_API_MAX_RETRIES, e
                );
            }
            e
        })
}
