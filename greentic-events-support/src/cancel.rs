use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The caller's context was cancelled before the work finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Drive `fut` to completion unless `ctx` is cancelled first. The future is
/// dropped on cancellation, so in-flight work stops at its next await.
pub async fn run_cancellable<F>(ctx: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    if ctx.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Cancelled),
        output = fut => Ok(output),
    }
}
