use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// How long harness checks keep re-reading state that a broker makes
/// visible eventually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patience {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Patience {
    /// Budget for reading back delivered events.
    pub const DELIVERY: Patience = Patience {
        timeout: Duration::from_secs(10),
        interval: Duration::from_millis(200),
    };

    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Run `check` until it succeeds or the next attempt would start past
    /// the deadline. The last failure is returned.
    pub async fn until<F, Fut, T, E>(self, mut check: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            let failure = match check().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            if Instant::now() + self.interval > deadline {
                return Err(failure);
            }
            sleep(self.interval).await;
        }
    }
}

/// Whether the switch `var` is on: `1`, `true`, `yes` or `on`, any case.
pub fn env_flag(var: &str) -> bool {
    std::env::var(var).is_ok_and(|value| flag_is_on(&value))
}

fn flag_is_on(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
