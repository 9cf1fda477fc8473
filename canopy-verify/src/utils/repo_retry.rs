//! Repository read retry logic
//!
//! Implements bounded exponential backoff for transient repository
//! errors. Only idempotent reads go through here; the admit write is
//! never blindly retried, since a retry after an ambiguous failure could
//! double-insert the record.

use std::time::Duration;

use canopy_common::{Error, Result};

/// Maximum read attempts before surfacing the error
const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff; doubles per attempt
const INITIAL_BACKOFF_MS: u64 = 50;

/// Retry an idempotent repository read with exponential backoff.
///
/// Only database-class errors are retried; anything else fails
/// immediately.
pub async fn retry_read<F, Fut, T>(operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    for attempt in 1..=MAX_ATTEMPTS {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Repository read succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                let retryable = matches!(err, Error::Database(_));
                if !retryable || attempt == MAX_ATTEMPTS {
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    backoff_ms,
                    "Repository read failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }
    }

    unreachable!("retry loop returns on final attempt")
}
