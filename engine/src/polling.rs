//! Polling of asynchronous platform operations

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::errors::{EngineError, TimeoutKind};

/// Outcome of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Terminal state reached
    Done,
    /// Keep polling
    Pending,
}

/// Interval used by every platform polling loop
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Call `check` every `interval` until it reports [`Poll::Done`] or fails.
///
/// Elapsed time is checked before each attempt, so a `timeout` of zero never calls `check`.
/// Exceeding `timeout` yields [`EngineError::Timeout`] carrying `kind`.
pub async fn poll_with_timeout<F, Fut>(
    interval: Duration,
    timeout: Duration,
    kind: TimeoutKind,
    mut check: F,
) -> Result<(), EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll, EngineError>>,
{
    poll_for(interval, timeout, kind, || {
        let fut = check();
        async move {
            Ok(match fut.await? {
                Poll::Done => Some(()),
                Poll::Pending => None,
            })
        }
    })
    .await
}

/// Same loop as [`poll_with_timeout`], returning the value `check` settles on. `None` keeps
/// polling.
pub async fn poll_for<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    kind: TimeoutKind,
    mut check: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, EngineError>>,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        if started.elapsed() >= timeout {
            debug!("polling for {} gave up after {} attempts", kind, attempt);
            return Err(EngineError::Timeout(kind));
        }
        attempt += 1;
        if let Some(value) = check().await? {
            return Ok(value);
        }
        tokio::time::sleep(interval).await;
    }
}
