//! Bounded polling with a fixed interval.
//!
//! Both the advisory lock wait and the readiness wait are the same shape of
//! loop: try, sleep, give up at the deadline. This helper is that loop.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Polls `attempt` until it yields `Some`, the deadline passes, or it fails.
///
/// Returns `Ok(None)` when the timeout elapsed without success. The first
/// attempt always runs, even with a zero timeout.
pub async fn poll_until<T, E, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = attempt().await? {
            return Ok(Some(value));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}
