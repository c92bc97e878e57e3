//! Bounded automatic retry with exponential backoff.
//!
//! Only attempts that produced no HTTP response are retried, and only for
//! idempotent calls. A received response, even a 5xx, ends the loop and is
//! handed to the caller.

use crate::executor::Outcome;
use rand::Rng;
use std::time::Duration;

/// Delay before the first retry.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Growth factor of the delay between consecutive retries.
pub const BACKOFF_MULTIPLIER: u32 = 3;

/// Lower bound of the jitter factor applied to each delay.
pub const MIN_JITTER: f64 = 0.75;

/// Exponential backoff schedule.
///
/// The nominal delay before retry `n` (1-indexed) is
/// `initial_delay * multiplier^(n - 1)`; with jitter the actual delay is a
/// uniformly random 75% to 100% of that.
///
/// # Examples
///
/// ```
/// use paycall::retry::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::default().without_jitter();
/// assert_eq!(backoff.delay_for_retry(1), Duration::from_millis(100));
/// assert_eq!(backoff.delay_for_retry(2), Duration::from_millis(300));
/// assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(900));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// The delay before the first retry.
    pub initial_delay: Duration,
    /// Factor applied per additional retry.
    pub multiplier: u32,
    /// Whether to scale delays by a random factor in `[0.75, 1.0]`.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_BACKOFF,
            multiplier: BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl Backoff {
    /// Disables jitter, making delays deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Returns the unjittered delay before retry `retry` (1-indexed).
    pub fn nominal_delay(&self, retry: usize) -> Duration {
        let exponent = retry.saturating_sub(1).min(u32::MAX as usize) as u32;
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_delay.saturating_mul(factor)
    }

    /// Returns the delay to sleep before retry `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: usize) -> Duration {
        let delay = self.nominal_delay(retry);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(MIN_JITTER..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

/// Decides whether and when a failed attempt is repeated.
///
/// # Examples
///
/// ```
/// use paycall::retry::RetryPolicy;
///
/// // Reads get the configured bound, writes get a single attempt.
/// assert_eq!(RetryPolicy::new(3, true).max_attempts(), 4);
/// assert_eq!(RetryPolicy::new(3, false).max_attempts(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

/// The final outcome of a retried call and how many attempts it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub outcome: Outcome,
    pub attempts: usize,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` extra attempts when the
    /// operation is `idempotent`, and none otherwise.
    pub fn new(max_retries: u32, idempotent: bool) -> Self {
        Self {
            max_retries: if idempotent { max_retries } else { 0 },
            backoff: Backoff::default(),
        }
    }

    /// Replaces the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> usize {
        self.max_retries as usize + 1
    }

    /// Returns `true` if `outcome` of attempt `attempt` (1-indexed) should be
    /// followed by another attempt.
    pub fn should_retry(&self, outcome: &Outcome, attempt: usize) -> bool {
        outcome.is_transport_failure() && attempt < self.max_attempts()
    }

    /// Runs `attempt_fn` until it yields a response or the bound is reached,
    /// sleeping the backoff delay between attempts on the calling thread.
    ///
    /// `attempt_fn` receives the 1-indexed attempt number. The outcome of the
    /// last attempt is returned unchanged.
    pub fn run<F>(&self, mut attempt_fn: F) -> RetryOutcome
    where
        F: FnMut(usize) -> Outcome,
    {
        let mut attempt = 1;
        loop {
            let outcome = attempt_fn(attempt);
            if !self.should_retry(&outcome, attempt) {
                return RetryOutcome {
                    outcome,
                    attempts: attempt,
                };
            }

            let delay = self.backoff.delay_for_retry(attempt);
            tracing::info!(
                delay_ms = delay.as_millis(),
                attempt = attempt,
                max_attempts = self.max_attempts(),
                "Retrying request after delay"
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}
