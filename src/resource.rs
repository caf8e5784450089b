// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The resource envelope and condition primitives shared by every Fabrica
//! kind: `{ apiVersion, kind, schemaVersion, metadata, spec, status }`.
//!
//! The [`Condition`] type is lifted nearly verbatim from the teacher's own
//! `Condition` struct (`src/crd.rs`), which already matched this shape.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed boolean with provenance attached to a resource's `status`.
///
/// Set-by-type semantics: setting a condition whose `type` already exists
/// replaces it in place; `last_transition_time` only advances when `status`
/// actually flips.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Ready`, `Reconciling`.
    pub r#type: String,
    /// `True`, `False`, or `Unknown`.
    pub status: ConditionStatus,
    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message with details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC 3339 timestamp of the last status flip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// The three-valued status a [`Condition`] may carry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The controller could not determine whether the condition holds.
    Unknown,
}

/// An ordered set of [`Condition`]s keyed by `type`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConditionList(Vec<Condition>);

impl ConditionList {
    /// An empty condition list.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Look up a condition by type.
    #[must_use]
    pub fn get(&self, r#type: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == r#type)
    }

    /// Whether the named condition is present and `True`.
    #[must_use]
    pub fn is_true(&self, r#type: &str) -> bool {
        matches!(self.get(r#type), Some(c) if c.status == ConditionStatus::True)
    }

    /// Insert or replace the condition with this `type`.
    ///
    /// Returns `true` if the `status` field changed relative to the previous
    /// entry (or there was no previous entry), in which case
    /// `last_transition_time` is advanced to `now`.
    pub fn set(
        &mut self,
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let r#type = r#type.into();
        if let Some(existing) = self.0.iter_mut().find(|c| c.r#type == r#type) {
            let status_changed = existing.status != status;
            existing.status = status;
            existing.reason = reason;
            existing.message = message;
            if status_changed {
                existing.last_transition_time = Some(now);
            }
            status_changed
        } else {
            self.0.push(Condition {
                r#type,
                status,
                reason,
                message,
                last_transition_time: Some(now),
            });
            true
        }
    }

    /// Iterate over the conditions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Number of conditions currently set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no conditions are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resource metadata common to every kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Globally unique, immutable identifier (kind-prefixed).
    pub uid: String,
    /// Human-assigned name, mutable.
    pub name: String,
    /// Immutable creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent mutation.
    pub updated_at: DateTime<Utc>,
    /// Set when a delete has been requested but finalizers remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Arbitrary identifying labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Arbitrary non-identifying metadata.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Cleanup hooks that must all be removed before deletion completes.
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Incremented on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Last generation the reconciler has observed; advanced only by it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Metadata {
    /// Whether this resource has been marked for deletion.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Generic status envelope: every kind's status carries at least a
/// condition list and an optional spec-version pointer.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Condition set, keyed by type.
    #[serde(default)]
    pub conditions: ConditionList,
    /// Most recent spec-snapshot id, when the kind opts into spec-versioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Kind-specific observed fields, stored as a JSON object so the generic
    /// envelope doesn't need to know each kind's status shape.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The full resource envelope: `{ apiVersion, kind, schemaVersion, metadata,
/// spec, status }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Group/version the resource was authored against, e.g. `fabrica/v1`.
    pub api_version: String,
    /// The kind name, e.g. `Device`.
    pub kind: String,
    /// The wire schema version this document is encoded in, e.g. `v1beta1`.
    pub schema_version: String,
    /// Immutable/system-owned metadata.
    pub metadata: Metadata,
    /// User-declared desired state.
    pub spec: Value,
    /// System-observed state.
    #[serde(default)]
    pub status: Status,
}

/// Registers and allocates kind-specific uid prefixes, and stamps fresh
/// [`Metadata`] for newly-created resources.
///
/// Mirrors the teacher's "process-wide singleton" pattern (the version
/// registry and condition publisher are both described the same way in
/// `SPEC_FULL.md` §9): a single process-global table guarded by a `Mutex`.
pub struct KindRegistry {
    prefixes: Mutex<BTreeMap<String, String>>,
    counter: AtomicU64,
}

static KIND_REGISTRY: OnceLock<KindRegistry> = OnceLock::new();

impl KindRegistry {
    fn global() -> &'static KindRegistry {
        KIND_REGISTRY.get_or_init(|| KindRegistry {
            prefixes: Mutex::new(BTreeMap::new()),
            counter: AtomicU64::new(0),
        })
    }

    /// Register the uid prefix for a kind. Returns an error if another kind
    /// already claims the same prefix.
    ///
    /// # Errors
    /// Returns [`crate::errors::FabricaError::Conflict`] when `prefix` is
    /// already registered to a different kind.
    pub fn register(kind: &str, prefix: &str) -> Result<(), crate::errors::FabricaError> {
        let registry = Self::global();
        let mut prefixes = registry
            .prefixes
            .lock()
            .expect("kind registry mutex poisoned");
        if let Some(existing_kind) = prefixes
            .iter()
            .find(|(_, p)| p.as_str() == prefix)
            .map(|(k, _)| k.clone())
        {
            if existing_kind != kind {
                return Err(crate::errors::FabricaError::Conflict(format!(
                    "uid prefix '{prefix}' already registered to kind '{existing_kind}'"
                )));
            }
        }
        prefixes.insert(kind.to_string(), prefix.to_string());
        Ok(())
    }

    /// Allocate a fresh uid for `kind`, using its registered prefix (or the
    /// lower-cased kind name if none was registered).
    #[must_use]
    pub fn new_uid(kind: &str) -> String {
        let registry = Self::global();
        let prefix = {
            let prefixes = registry.prefixes.lock().expect("kind registry mutex poisoned");
            prefixes
                .get(kind)
                .cloned()
                .unwrap_or_else(|| kind.to_lowercase())
        };
        let counter = registry.counter.fetch_add(1, Ordering::Relaxed);
        let random: u32 = rand::random();
        format!("{prefix}-{now:x}-{counter:x}-{random:08x}", now = Utc::now().timestamp_micros())
    }
}

impl Resource {
    /// Construct a new resource, stamping fresh metadata (allocating a uid,
    /// setting timestamps and `generation = 1`).
    #[must_use]
    pub fn new(api_version: &str, kind: &str, schema_version: &str, name: &str, spec: Value) -> Self {
        let now = Utc::now();
        Resource {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            schema_version: schema_version.to_string(),
            metadata: Metadata {
                uid: KindRegistry::new_uid(kind),
                name: name.to_string(),
                created_at: now,
                updated_at: now,
                deletion_timestamp: None,
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                finalizers: Vec::new(),
                generation: 1,
                observed_generation: None,
            },
            spec,
            status: Status::default(),
        }
    }

    /// Set (or replace) a condition on this resource's status, returning
    /// whether the status actually transitioned.
    pub fn set_condition(
        &mut self,
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) -> bool {
        self.status
            .conditions
            .set(r#type, status, reason, message, Utc::now())
    }

    /// Set a condition and, when it transitions, publish a condition event
    /// through `bus` (the condition <-> event bridge, C7).
    pub async fn set_condition_with_events(
        &mut self,
        r#type: impl Into<String> + Clone,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
        bus: &crate::events::EventBus,
    ) {
        let r#type = r#type.into();
        let transitioned = self.set_condition(r#type.clone(), status, reason.clone(), message.clone());
        if transitioned {
            bus.publish_condition_event(self, &r#type, status, reason, message)
                .await;
        }
    }

    /// Bump `generation` to mark that the spec has changed.
    pub fn bump_generation(&mut self) {
        self.metadata.generation += 1;
        self.metadata.updated_at = Utc::now();
    }

    /// Whether the reconciler needs to act: `generation` and
    /// `observed_generation` differ, or the resource has never been
    /// observed.
    #[must_use]
    pub fn needs_reconcile(&self) -> bool {
        should_reconcile(Some(self.metadata.generation), self.metadata.observed_generation)
    }
}

/// Check if a resource's spec has changed by comparing `generation` with
/// `observed_generation`. Lifted from the teacher's
/// `reconcilers::should_reconcile`.
#[must_use]
pub fn should_reconcile(current_generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Check if a status value has actually changed, to avoid redundant writes
/// that would otherwise cause reconcile-loop thrash. Lifted from the
/// teacher's `reconcilers::status_changed`.
#[must_use]
pub fn status_changed<T: PartialEq>(current_value: &Option<T>, new_value: &Option<T>) -> bool {
    current_value != new_value
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod resource_tests;
