// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn lifecycle_event_type_is_prefix_kind_verb() {
    let event = CloudEvent::lifecycle(
        "io.fabrica",
        "io.fabrica/reconciler",
        "Device",
        "created",
        "devices/dev-1".to_string(),
        json!({}),
    );
    assert_eq!(event.r#type, "io.fabrica.device.created");
    assert_eq!(event.specversion, "1.0");
    assert_eq!(event.subject.as_deref(), Some("devices/dev-1"));
}

#[test]
fn condition_event_type_is_prefix_type() {
    let event = CloudEvent::condition(
        "io.fabrica.condition",
        "io.fabrica/reconciler",
        "Ready",
        "devices/dev-1".to_string(),
        json!({"status": "True"}),
    );
    assert_eq!(event.r#type, "io.fabrica.condition.ready");
}

#[test]
fn event_ids_are_unique() {
    let a = CloudEvent::lifecycle("p", "s", "Device", "created", "d/1".to_string(), json!({}));
    let b = CloudEvent::lifecycle("p", "s", "Device", "created", "d/1".to_string(), json!({}));
    assert_ne!(a.id, b.id);
}
