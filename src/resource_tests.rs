// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn new_resource_stamps_generation_one_and_uid() {
    let r = Resource::new("fabrica/v1", "Widget", "v1", "my-widget", json!({"color": "red"}));
    assert_eq!(r.metadata.generation, 1);
    assert!(r.metadata.observed_generation.is_none());
    assert!(!r.metadata.uid.is_empty());
    assert_eq!(r.metadata.created_at, r.metadata.updated_at);
}

#[test]
fn registered_prefix_is_used_for_new_uids() {
    KindRegistry::register("Gadget", "gdg").unwrap();
    let uid = KindRegistry::new_uid("Gadget");
    assert!(uid.starts_with("gdg-"));
}

#[test]
fn conflicting_prefix_registration_is_rejected() {
    KindRegistry::register("Thing", "thg").unwrap();
    let err = KindRegistry::register("OtherThing", "thg").unwrap_err();
    assert_eq!(err.status_code(), 409);
}

#[test]
fn condition_set_by_type_replaces_existing() {
    let mut list = ConditionList::new();
    let t0 = Utc::now();
    assert!(list.set("Ready", ConditionStatus::False, None, None, t0));
    assert_eq!(list.len(), 1);

    // Same status: no transition, timestamp should not move forward, message may update.
    let changed = list.set(
        "Ready",
        ConditionStatus::False,
        Some("Waiting".into()),
        None,
        t0 + chrono::Duration::seconds(5),
    );
    assert!(!changed);
    assert_eq!(list.get("Ready").unwrap().last_transition_time, Some(t0));

    // Status flips: transition timestamp advances.
    let t1 = t0 + chrono::Duration::seconds(10);
    let changed = list.set("Ready", ConditionStatus::True, None, None, t1);
    assert!(changed);
    assert_eq!(list.len(), 1);
    assert_eq!(list.get("Ready").unwrap().last_transition_time, Some(t1));
    assert!(list.is_true("Ready"));
}

#[test]
fn should_reconcile_matches_generation_semantics() {
    assert!(should_reconcile(Some(2), Some(1)));
    assert!(!should_reconcile(Some(2), Some(2)));
    assert!(should_reconcile(Some(1), None));
    assert!(!should_reconcile(None, None));
}

#[test]
fn status_changed_detects_difference() {
    assert!(status_changed(&Some(1), &Some(2)));
    assert!(!status_changed(&Some(1), &Some(1)));
    assert!(status_changed(&None, &Some(1)));
}

#[test]
fn needs_reconcile_reflects_generation_drift() {
    let mut r = Resource::new("fabrica/v1", "Widget", "v1", "w1", json!({}));
    assert!(r.needs_reconcile());
    r.metadata.observed_generation = Some(1);
    assert!(!r.needs_reconcile());
    r.bump_generation();
    assert!(r.needs_reconcile());
}
