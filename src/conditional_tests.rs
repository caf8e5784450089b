// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;
use chrono::Duration;

#[test]
fn etag_is_deterministic_and_quoted() {
    let a = compute_etag(b"hello");
    let b = compute_etag(b"hello");
    assert_eq!(a, b);
    assert!(a.starts_with('"') && a.ends_with('"'));
    assert_ne!(a, compute_etag(b"world"));
}

#[test]
fn weak_etag_is_prefixed() {
    let weak = compute_weak_etag(b"hello");
    assert!(weak.starts_with("W/\""));
}

#[test]
fn cache_control_renders_selected_directives() {
    let cc = CacheControl {
        public: true,
        max_age: Some(60),
        must_revalidate: true,
        ..Default::default()
    };
    let header = cc.to_header_value();
    assert!(header.contains("public"));
    assert!(header.contains("max-age=60"));
    assert!(header.contains("must-revalidate"));
}

#[test]
fn if_match_mismatch_is_precondition_failed() {
    let info = ConditionalInfo {
        if_match: Some("\"stale\"".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "PUT", "\"current\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::PreconditionFailed);
}

#[test]
fn if_match_matching_proceeds() {
    let info = ConditionalInfo {
        if_match: Some("\"current\"".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "PUT", "\"current\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::Proceed);
}

#[test]
fn if_none_match_on_get_yields_not_modified() {
    let info = ConditionalInfo {
        if_none_match: Some("\"current\"".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "GET", "\"current\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::NotModified);
}

#[test]
fn if_none_match_on_put_yields_precondition_failed() {
    let info = ConditionalInfo {
        if_none_match: Some("\"current\"".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "PUT", "\"current\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::PreconditionFailed);
}

#[test]
fn if_none_match_star_matches_any_existing_resource() {
    let info = ConditionalInfo {
        if_none_match: Some("*".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "POST", "\"anything\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::PreconditionFailed);
}

#[test]
fn if_unmodified_since_in_the_past_fails_precondition() {
    let now = Utc::now();
    let info = ConditionalInfo {
        if_unmodified_since: Some(now - Duration::hours(1)),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "PUT", "\"etag\"", now);
    assert_eq!(outcome, ConditionalOutcome::PreconditionFailed);
}

#[test]
fn if_modified_since_not_modified_on_get() {
    let now = Utc::now();
    let info = ConditionalInfo {
        if_modified_since: Some(now + Duration::hours(1)),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "GET", "\"etag\"", now);
    assert_eq!(outcome, ConditionalOutcome::NotModified);
}

#[test]
fn if_match_takes_precedence_over_if_none_match() {
    let info = ConditionalInfo {
        if_match: Some("\"stale\"".to_string()),
        if_none_match: Some("\"current\"".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "PUT", "\"current\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::PreconditionFailed);
}

#[test]
fn weak_etags_compare_equal_ignoring_weak_marker() {
    let info = ConditionalInfo {
        if_none_match: Some("W/\"current\"".to_string()),
        ..Default::default()
    };
    let outcome = check_conditional_request(&info, "GET", "\"current\"", Utc::now());
    assert_eq!(outcome, ConditionalOutcome::NotModified);
}

#[test]
fn safe_method_detection() {
    assert!(is_safe_method("GET"));
    assert!(is_safe_method("head"));
    assert!(!is_safe_method("POST"));
}
