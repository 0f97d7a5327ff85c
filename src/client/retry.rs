//! Retry policy with exponential backoff

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

fn default_max_attempts() -> u32 {
    6
}

fn default_initial_interval() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    1.1
}

fn default_max_interval() -> u64 {
    2000
}

/// How often and how patiently a fail-fast client retries.
///
/// Intervals are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_interval")]
    pub initial_interval: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_interval")]
    pub max_interval: u64,
    /// Add up to `(multiplier - 1) * interval` of random jitter to each sleep.
    #[serde(default)]
    pub use_random_policy: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval: default_initial_interval(),
            multiplier: default_multiplier(),
            max_interval: default_max_interval(),
            use_random_policy: false,
        }
    }
}

impl RetryPolicy {
    /// Sleep durations between attempts; yields `max_attempts - 1` values.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            next_interval: self.initial_interval as f64,
            remaining: self.max_attempts.saturating_sub(1),
        }
    }
}

/// Iterator over backoff sleeps.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    next_interval: f64,
    remaining: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let max = self.policy.max_interval as f64;
        let interval = self.next_interval.min(max);
        let sleep = if self.policy.use_random_policy && self.policy.multiplier > 1.0 {
            let jitter = rand::thread_rng().gen_range(0.0..1.0) * (self.policy.multiplier - 1.0) * interval;
            (interval + jitter).min(max)
        } else {
            interval
        };
        self.next_interval = (interval * self.policy.multiplier.max(1.0)).min(max);
        Some(Duration::from_millis(sleep.round() as u64))
    }
}

/// Blocking sleep - allows tests to observe backoff without waiting
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
