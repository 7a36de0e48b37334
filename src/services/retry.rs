//! Bounded retry with a caller-supplied delay schedule.

use std::future::Future;
use std::time::Duration;

/// How many times to try an operation and how long to wait between tries.
///
/// `delay(n, step)` is the pause taken after failed attempt `n` (1-based)
/// when another attempt follows.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    step: Duration,
    delay: fn(u32, Duration) -> Duration,
}

fn constant_delay(_attempt: u32, step: Duration) -> Duration {
    step
}

fn growing_delay(attempt: u32, step: Duration) -> Duration {
    step * attempt
}

impl RetryPolicy {
    /// Custom schedule computed from the attempt number and a base step.
    pub const fn new(attempts: u32, step: Duration, delay: fn(u32, Duration) -> Duration) -> Self {
        Self {
            attempts,
            step,
            delay,
        }
    }

    /// Same pause between every attempt.
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self::new(attempts, delay, constant_delay)
    }

    /// Pause grows by `step` after every failed attempt: step, 2*step, ...
    pub const fn linear(attempts: u32, step: Duration) -> Self {
        Self::new(attempts, step, growing_delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause after failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.delay)(attempt, self.step)
    }

    /// Pauses between consecutive attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.attempts).map(|attempt| self.delay_after(attempt))
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// when every attempt fails. A policy with zero attempts still runs once.
    pub async fn retry<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(_) => {
                    let pause = self.delay_after(attempt);
                    tracing::debug!("Attempt {}/{} failed, retrying in {:?}", attempt, attempts, pause);
                    tokio::time::sleep(pause).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("delays", &self.delays().collect::<Vec<_>>())
            .finish()
    }
}
