//! Retry policy for the network leg of a transfer.

use backoff::backoff::Backoff as BackoffTrait;
use backoff::ExponentialBackoff;
use std::time::Duration;

/// Configuration for retrying the outbound HTTP request.  Retries apply to
/// the network leg only; storage writes are never retried.
#[derive(Debug, Clone)]
pub struct Retry {
    /// Number of retries (not counting the first try) for transient
    /// failures.  Zero disables retries entirely.
    pub retries: u32,

    /// Maximum interval between retries.
    pub max_delay: Duration,

    /// Base delay: the wait before retry `n` is `delay_factor * 2^(n-1)`.
    pub delay_factor: Duration,

    /// Randomization factor applied to each delay:
    /// delay = delay * random([1 - f; 1 + f]).
    pub randomization_factor: f64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            retries: 3,
            max_delay: Duration::from_secs(30),
            delay_factor: Duration::from_millis(1000),
            randomization_factor: 0.25,
        }
    }
}

impl Retry {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }
}

/// Backoff tracker for a single, possibly-retried operation.  This is a thin
/// wrapper around [backoff::ExponentialBackoff].
#[derive(Debug)]
pub struct Backoff<'a> {
    retry: &'a Retry,
    tries: u32,
    backoff: ExponentialBackoff,
}

impl<'a> Backoff<'a> {
    pub fn new(retry: &Retry) -> Backoff {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: None, // we count retries instead
            max_interval: retry.max_delay,
            initial_interval: retry.delay_factor,
            multiplier: 2.0,
            #[cfg(not(test))]
            randomization_factor: retry.randomization_factor,
            #[cfg(test)]
            randomization_factor: 0.0,
            ..Default::default()
        };
        backoff.reset();
        Backoff {
            retry,
            tries: 0,
            backoff,
        }
    }

    /// Return the next backoff interval or, if the operation should not be
    /// retried, None.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        self.tries += 1;
        if self.tries > self.retry.retries {
            None
        } else {
            self.backoff.next_backoff()
        }
    }
}
