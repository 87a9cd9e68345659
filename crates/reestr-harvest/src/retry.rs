//! Retry helper for flaky UI interactions.
//!
//! The registry front end re-renders its card list and pager on every
//! interaction, so element handles routinely go stale and overlays hide
//! targets for a moment. Retryable failures (stale reference, wait
//! timeout, unexpected dialog) get a repair pass and a short fixed delay
//! before the next attempt; everything else is propagated immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::{is_retryable_ui, HarvestError};

/// Executes `operation` up to `max_attempts` times.
///
/// After each retryable failure the `repair` callback runs (typically a
/// re-scroll, a dialog dismissal, or both) followed by a fixed `delay`
/// sleep. Non-retryable errors and the last retryable error are returned
/// to the caller.
pub(crate) async fn with_retry<T, F, Fut, R, RFut>(
    max_attempts: u32,
    delay: Duration,
    mut operation: F,
    mut repair: R,
) -> Result<T, HarvestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HarvestError>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = ()>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable_ui(&err) || attempt >= max_attempts.max(1) {
                    return Err(err);
                }
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "retryable ui failure, repairing and retrying"
                );
                repair().await;
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
