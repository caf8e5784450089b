// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn backoff_doubles_and_caps_at_max_interval() {
    let mut backoff = ExponentialBackoff::new(Duration::from_millis(1000), Duration::from_secs(5), 2.0, 0.0);
    let d1 = backoff.next_backoff();
    let d2 = backoff.next_backoff();
    let d3 = backoff.next_backoff();
    let d4 = backoff.next_backoff();

    assert_eq!(d1, Duration::from_secs(1));
    assert_eq!(d2, Duration::from_secs(2));
    assert_eq!(d3, Duration::from_secs(4));
    assert_eq!(d4, Duration::from_secs(5), "capped at max_interval");
}

#[test]
fn jitter_stays_within_randomization_factor() {
    let mut backoff = ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(100), 1.0, 0.1);
    for _ in 0..20 {
        let d = backoff.next_backoff();
        assert!(d.as_secs_f64() >= 9.0 && d.as_secs_f64() <= 11.0, "{d:?} out of jitter bounds");
    }
}

#[test]
fn reset_restores_initial_interval() {
    let mut backoff = ExponentialBackoff::new(Duration::from_millis(1000), Duration::from_secs(300), 2.0, 0.0);
    backoff.next_backoff();
    backoff.next_backoff();
    backoff.reset();
    assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
}

#[test]
fn default_backoff_matches_reconcile_constants() {
    let mut backoff = default_backoff();
    let first = backoff.next_backoff();
    assert!(first.as_secs_f64() >= 0.9 && first.as_secs_f64() <= 1.1);
}
