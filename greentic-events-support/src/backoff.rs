//! Bounded exponential backoff with jitter.
//!
//! A [`Backoff`] hands out at most `max_retries` delays. The first delay is a
//! jittered `min`; every later delay doubles the previous one, caps it at
//! `max` and applies fresh jitter. Jitter only ever shortens a delay, by up
//! to [`JITTER_FACTOR`], so no delay exceeds `max`.
//!
//! Instances carry mutable state and are meant to be owned by a single
//! caller for the duration of one retried operation.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Largest fraction a delay can be shortened by.
pub const JITTER_FACTOR: f64 = 0.25;

/// Returned once a [`Backoff`] has produced all of its delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("max retries exceeded")]
pub struct MaxRetryError;

/// Exhaustion of a retry loop, carrying the error of the final attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub last: E,
}

impl<E> RetryExhausted<E> {
    pub fn into_last(self) -> E {
        self.last
    }
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MaxRetryError}: {}", self.last)
    }
}

impl<E> StdError for RetryExhausted<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.last)
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    max_retries: u32,
    min: Duration,
    max: Duration,
    attempt: u32,
    current: Duration,
}

impl Backoff {
    /// Callers guarantee `min <= max`.
    pub fn new(max_retries: u32, min: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            min,
            max,
            attempt: 0,
            current: jitter(min),
        }
    }

    /// The delay the next call to [`Backoff::next`] will return on its
    /// first attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Advance the schedule. State is left untouched once exhausted.
    pub fn next(&mut self) -> Result<Duration, MaxRetryError> {
        if self.attempt >= self.max_retries {
            return Err(MaxRetryError);
        }
        let attempt = self.attempt;
        self.attempt += 1;
        if attempt == 0 {
            return Ok(self.current);
        }

        let doubled = self.current.saturating_mul(2).min(self.max);
        self.current = jitter(doubled);
        Ok(self.current)
    }

    /// Wait out the next delay.
    pub async fn next_sleep(&mut self) -> Result<(), MaxRetryError> {
        let delay = self.next()?;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current = jitter(self.min);
    }

    /// Run `op` until it succeeds or the schedule is exhausted, sleeping
    /// between failed attempts. `op` runs at most `max_retries + 1` times.
    pub async fn retry<F, Fut, T, E>(&mut self, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if self.next_sleep().await.is_err() {
                return Err(RetryExhausted { last: err });
            }
        }
    }
}

/// Shorten `delay` by a random fraction in `[0, JITTER_FACTOR)`.
fn jitter(delay: Duration) -> Duration {
    let u: f64 = rand::random();
    let nanos = delay.as_nanos() as f64 * (1.0 - JITTER_FACTOR * u);
    Duration::from_nanos(nanos.floor() as u64)
}
