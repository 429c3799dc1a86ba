use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;

/// Stand-in deadline for sleeps too long to represent, roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Pool of reusable sleep timers.
///
/// Timers are reset and handed back after every wait instead of being
/// allocated anew for each tick or bounded capture.
#[derive(Default)]
pub struct TimerPool {
    timers: Mutex<Vec<Pin<Box<Sleep>>>>,
}

impl TimerPool {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sleeps for `d` or until `cancel` fires, whichever comes first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, d: Duration, cancel: &CancellationToken) -> bool {
        let now = Instant::now();
        let deadline = now.checked_add(d).unwrap_or_else(|| now + FAR_FUTURE);
        let reused = self.timers.lock().pop();
        let mut timer = match reused {
            Some(mut timer) => {
                timer.as_mut().reset(deadline);
                timer
            }
            None => Box::pin(tokio::time::sleep_until(deadline)),
        };

        let elapsed = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = &mut timer => true,
        };

        self.timers.lock().push(timer);
        elapsed
    }

    /// Number of timers waiting to be reused.
    pub fn idle(&self) -> usize {
        self.timers.lock().len()
    }
}

const JITTER_BASE: Duration = Duration::from_secs(1);
const JITTER_STEPS: u64 = 9;

/// Random extra delay added to every tick so that agents started together
/// drift apart.
#[derive(Debug)]
pub struct Jitter {
    rng: StdRng,
}

impl Jitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// `d` plus 1 to 9 whole seconds, saturating at [`Duration::MAX`].
    pub fn tick(&mut self, d: Duration) -> Duration {
        let noise = JITTER_BASE + Duration::from_secs(self.rng.gen_range(0..JITTER_STEPS));
        d.saturating_add(noise)
    }
}
