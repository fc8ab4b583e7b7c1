//! Cancellation helpers for the composition pipeline

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SkycastError};

/// Run `fut` unless `token` fires first, in which case the future is dropped
/// and `SkycastError::Cancelled` is returned.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SkycastError::Cancelled),
        result = fut => result,
    }
}

/// Child of `parent` that also cancels itself once `timeout` elapses.
///
/// Must be called from within a tokio runtime.
pub fn with_deadline(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    let timer = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!("Composition deadline of {:?} reached", timeout);
                timer.cancel();
            }
            _ = timer.cancelled() => {}
        }
    });
    child
}
