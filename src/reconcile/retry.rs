// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Exponential backoff for reconcile requeue delays.
//!
//! Adapted from the teacher's `reconcilers::retry::ExponentialBackoff`. The
//! teacher used this to retry a single Kubernetes API call in a loop; here
//! the same jittered-doubling algorithm instead computes the delay before
//! the next reconcile attempt for a `(kind, uid)` pair, since a Fabrica
//! reconciler yields a requeue delay rather than blocking on retries itself.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::constants::{
    RECONCILE_BACKOFF_MULTIPLIER, RECONCILE_INITIAL_INTERVAL_MILLIS, RECONCILE_MAX_INTERVAL_SECS,
    RECONCILE_RANDOMIZATION_FACTOR,
};

/// Jittered exponential backoff, one instance kept per `(kind, uid)` by the
/// controller for as long as that resource keeps failing to reconcile.
pub struct ExponentialBackoff {
    current_interval: Duration,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    fn new(initial_interval: Duration, max_interval: Duration, multiplier: f64, randomization_factor: f64) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// The next delay, with jitter applied, doubling the underlying interval
    /// (capped at `max_interval`) for the following call.
    pub fn next_backoff(&mut self) -> Duration {
        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        jittered
    }

    /// Reset to the initial interval, e.g. after a successful reconcile.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    /// How long this backoff has been running since creation or last reset.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }
        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;
        let mut rng = rand::rng();
        let jittered = rng.random_range(min..=max);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// The default reconcile backoff: 1s initial interval, doubling up to a
/// 5-minute cap, with ±10% jitter.
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(RECONCILE_INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(RECONCILE_MAX_INTERVAL_SECS),
        RECONCILE_BACKOFF_MULTIPLIER,
        RECONCILE_RANDOMIZATION_FACTOR,
    )
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
