// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn single_star_matches_exactly_one_segment() {
    assert!(matches("io.fabrica.*.created", "io.fabrica.device.created"));
    assert!(!matches("io.fabrica.*.created", "io.fabrica.device.sub.created"));
    assert!(!matches("io.fabrica.*.created", "io.fabrica.created"));
}

#[test]
fn double_star_matches_zero_or_more_segments() {
    assert!(matches("io.fabrica.**", "io.fabrica.device.created"));
    assert!(matches("io.fabrica.**", "io.fabrica"));
    assert!(matches("**", "anything.at.all"));
    assert!(matches("io.fabrica.**.created", "io.fabrica.device.nested.created"));
}

#[test]
fn exact_literal_match_required_without_wildcards() {
    assert!(matches("io.fabrica.device.created", "io.fabrica.device.created"));
    assert!(!matches("io.fabrica.device.created", "io.fabrica.device.updated"));
}

#[test]
fn empty_filter_matches_only_empty_type() {
    assert!(matches("", ""));
    assert!(!matches("", "io.fabrica"));
}
