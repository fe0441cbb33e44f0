use std::fmt::Display;
use std::time::Duration;
use tracing::{error, warn};

/// Exponential backoff: waits `base_delay * 2^attempt` between attempts.
///
/// Every error is retried the same way; there is no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const TEXT_GENERATION: RetryPolicy = RetryPolicy::new(2, Duration::from_secs(3));
    pub const RESEARCH: RetryPolicy = RetryPolicy::new(2, Duration::from_secs(2));
    pub const SPEECH: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(2));
    pub const IMAGE: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(2));
    pub const UPLOAD: RetryPolicy = RetryPolicy::new(2, Duration::from_secs(5));

    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `op` until it succeeds or `max_retries + 1` attempts have failed.
    pub fn run<T, E, F>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        self.run_with_sleep(label, op, std::thread::sleep)
    }

    /// Same as [`run`](Self::run) with a caller-supplied sleep.
    pub fn run_with_sleep<T, E, F, S>(&self, label: &str, mut op: F, mut sleep: S) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
        S: FnMut(Duration),
    {
        let attempts = self.max_retries + 1;
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{label} failed (attempt {}/{attempts}): {e} - retrying in {:.1}s",
                        attempt + 1,
                        delay.as_secs_f64()
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    error!("{label} failed after {attempts} attempts: {e}");
                    return Err(e);
                }
            }
        }
    }
}
