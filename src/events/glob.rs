// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Glob-style matching for event-type subscription filters: `*` matches
//! exactly one dot-separated segment, `**` matches zero or more segments.
//!
//! No glob-matching crate appears anywhere in the retrieved example corpus,
//! so this is hand-rolled in the spirit of the teacher's own hand-rolled
//! `selector.rs` label-selector matcher.

/// Whether `event_type` (dot-segmented, e.g. `io.fabrica.device.created`)
/// matches `filter` (e.g. `io.fabrica.*.created` or `io.fabrica.**`).
#[must_use]
pub fn matches(filter: &str, event_type: &str) -> bool {
    let filter_segments: Vec<&str> = filter.split('.').collect();
    let type_segments: Vec<&str> = event_type.split('.').collect();
    matches_segments(&filter_segments, &type_segments)
}

fn matches_segments(filter: &[&str], value: &[&str]) -> bool {
    match filter.first() {
        None => value.is_empty(),
        Some(&"**") => {
            if filter.len() == 1 {
                return true;
            }
            (0..=value.len()).any(|i| matches_segments(&filter[1..], &value[i..]))
        }
        Some(&"*") => !value.is_empty() && matches_segments(&filter[1..], &value[1..]),
        Some(literal) => {
            !value.is_empty() && value[0] == *literal && matches_segments(&filter[1..], &value[1..])
        }
    }
}

#[cfg(test)]
#[path = "glob_tests.rs"]
mod glob_tests;
