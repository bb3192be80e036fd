//! Helpers shared by event plugins: bounded jittered backoff, cancellation
//! aware awaits and tracing setup.

pub mod backoff;
pub mod cancel;
pub mod telemetry;

pub use backoff::{Backoff, MaxRetryError, RetryExhausted, JITTER_FACTOR};
pub use cancel::{run_cancellable, Cancelled};
pub use tokio_util::sync::CancellationToken;
