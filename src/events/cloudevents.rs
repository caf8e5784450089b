// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CloudEvents 1.0 envelope and Fabrica's lifecycle/condition event-type
//! naming conventions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::CLOUDEVENTS_SPEC_VERSION;

/// A CloudEvents 1.0 envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudEvent {
    /// CloudEvents spec version, always `"1.0"`.
    pub specversion: String,
    /// Dot-segmented event type, e.g. `io.fabrica.device.created`.
    pub r#type: String,
    /// URI-like identifier for the event producer.
    pub source: String,
    /// Event id, unique within `source`.
    pub id: String,
    /// Event timestamp.
    pub time: DateTime<Utc>,
    /// Media type of `data`; always `application/json` for this bus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// Subject of the event, e.g. `devices/dev-1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Event payload.
    pub data: Value,
}

fn new_event_id() -> String {
    format!("{:x}-{:08x}", Utc::now().timestamp_micros(), rand::random::<u32>())
}

impl CloudEvent {
    /// Build a lifecycle event: `<prefix>.<kind-lower>.<verb>`.
    #[must_use]
    pub fn lifecycle(prefix: &str, source: &str, kind: &str, verb: &str, subject: String, data: Value) -> Self {
        CloudEvent {
            specversion: CLOUDEVENTS_SPEC_VERSION.to_string(),
            r#type: format!("{prefix}.{}.{verb}", kind.to_lowercase()),
            source: source.to_string(),
            id: new_event_id(),
            time: Utc::now(),
            datacontenttype: Some("application/json".to_string()),
            subject: Some(subject),
            data,
        }
    }

    /// Build a condition-transition event: `<condition-prefix>.<type-lower>`.
    #[must_use]
    pub fn condition(
        condition_prefix: &str,
        source: &str,
        condition_type: &str,
        subject: String,
        data: Value,
    ) -> Self {
        CloudEvent {
            specversion: CLOUDEVENTS_SPEC_VERSION.to_string(),
            r#type: format!("{condition_prefix}.{}", condition_type.to_lowercase()),
            source: source.to_string(),
            id: new_event_id(),
            time: Utc::now(),
            datacontenttype: Some("application/json".to_string()),
            subject: Some(subject),
            data,
        }
    }
}

#[cfg(test)]
#[path = "cloudevents_tests.rs"]
mod cloudevents_tests;
