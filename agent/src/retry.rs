use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::timer::TimerPool;

/// Outcome of a single failed attempt, as judged by the operation itself.
#[derive(Debug)]
pub enum Failure<E> {
    /// transient, worth another attempt after backing off
    Retryable(E),
    /// retrying won't help
    Terminal(E),
}

impl<E> Failure<E> {
    pub fn into_inner(self) -> E {
        match self {
            Failure::Retryable(e) | Failure::Terminal(e) => e,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Failure::Terminal(_))
    }
}

#[derive(Error, Debug)]
pub enum RetryError<E: StdError + 'static> {
    #[error(transparent)]
    Terminal(E),

    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("canceled while backing off after {attempts} attempts: {last}")]
    Canceled { attempts: u32, last: E },
}

impl<E: StdError + 'static> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { last, .. } | RetryError::Canceled { last, .. } => last,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Terminal(e) => e,
            RetryError::Exhausted { last, .. } | RetryError::Canceled { last, .. } => last,
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    pub const fn new(min_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.min_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .clamp(self.min_delay, self.max_delay)
    }

    /// Runs `op` until it succeeds, reports a terminal failure, or
    /// `max_attempts` is used up. Waits between attempts are cut short by
    /// `cancel`.
    pub async fn retry<T, E, F, Fut>(
        &self,
        timers: &TimerPool,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: StdError + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(v) => return Ok(v),
                Err(Failure::Terminal(e)) => return Err(RetryError::Terminal(e)),
                Err(Failure::Retryable(e)) => e,
            };

            if attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.delay(attempt);
            warn!("attempt {attempt}/{} failed, retrying in {delay:?}: {err}", self.max_attempts);
            if !timers.sleep(delay, cancel).await {
                return Err(RetryError::Canceled {
                    attempts: attempt,
                    last: err,
                });
            }
        }
    }
}
