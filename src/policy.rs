// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Authorization / policy engine: a `Policy` capability per kind, checked by
//! the HTTP layer before any storage access.
//!
//! No `casbin` crate appears anywhere in the retrieved example corpus, so the
//! rule-based engine is hand-rolled, in the spirit of the teacher's other
//! hand-rolled matching code (`selector.rs`) and shaped the same way the
//! teacher expresses its other capability traits (`async_trait`, e.g.
//! `reconcilers::finalizers::FinalizerCleanup`).

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Identity and claims supplied by upstream authentication middleware. The
/// policy engine never parses tokens; it only consumes this struct.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated subject id.
    pub user_id: String,
    /// Roles assigned to the subject.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Groups the subject belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Arbitrary additional claims.
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// The action derived from an HTTP method, per `SPEC_FULL.md` §4.9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    /// `GET`
    Read,
    /// `POST`
    Create,
    /// `PUT` or `PATCH`
    Update,
    /// `DELETE`
    Delete,
}

impl Action {
    /// Map an HTTP method name (case-insensitive) to the action it implies.
    /// Returns `None` for methods with no authorization meaning (e.g.
    /// `OPTIONS`).
    #[must_use]
    pub fn from_http_method(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" | "HEAD" => Some(Action::Read),
            "POST" => Some(Action::Create),
            "PUT" | "PATCH" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }
}

/// The outcome of a policy check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Whether the action is permitted.
    pub allowed: bool,
    /// Human-readable reason, useful for 403 bodies and audit logs.
    pub reason: String,
}

impl Decision {
    /// Build an `allowed` decision.
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into() }
    }

    /// Build a `denied` decision.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: reason.into() }
    }
}

/// A policy decides whether an [`AuthContext`] may perform [`Action`] on one
/// resource kind.
#[async_trait]
pub trait Policy: Send + Sync {
    /// List resources of this kind.
    async fn can_list(&self, auth: &AuthContext, kind: &str) -> Decision {
        self.check(auth, kind, Action::Read).await
    }
    /// Get one resource of this kind.
    async fn can_get(&self, auth: &AuthContext, kind: &str) -> Decision {
        self.check(auth, kind, Action::Read).await
    }
    /// Create a resource of this kind.
    async fn can_create(&self, auth: &AuthContext, kind: &str) -> Decision {
        self.check(auth, kind, Action::Create).await
    }
    /// Update (PUT/PATCH) a resource of this kind.
    async fn can_update(&self, auth: &AuthContext, kind: &str) -> Decision {
        self.check(auth, kind, Action::Update).await
    }
    /// Delete a resource of this kind.
    async fn can_delete(&self, auth: &AuthContext, kind: &str) -> Decision {
        self.check(auth, kind, Action::Delete).await
    }

    /// Shared evaluation entry point the `can_*` defaults funnel through.
    async fn check(&self, auth: &AuthContext, kind: &str, action: Action) -> Decision;
}

/// Allows everything. Intended for development environments only.
#[derive(Clone, Copy, Debug, Default)]
pub struct Permissive;

#[async_trait]
impl Policy for Permissive {
    async fn check(&self, _auth: &AuthContext, _kind: &str, _action: Action) -> Decision {
        Decision::allow("permissive policy")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RuleKey {
    role: String,
    object: String,
}

/// A Casbin-like `(role, object, action)` rule-based policy engine.
///
/// Subjects are authorized through role membership: a rule grants `action`
/// on `object` (a resource kind, or `"*"` for all kinds) to everyone holding
/// `role`.
#[derive(Default)]
pub struct RuleBased {
    inner: RwLock<RuleBasedState>,
}

#[derive(Default)]
struct RuleBasedState {
    rules: BTreeMap<RuleKey, BTreeSet<Action>>,
    roles: BTreeMap<String, BTreeSet<String>>,
}

impl RuleBased {
    /// An empty rule-based engine with no granted rules or role assignments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` permission to perform `action` on `object` (a kind name,
    /// or `"*"` for every kind).
    pub async fn add_rule(&self, role: impl Into<String>, object: impl Into<String>, action: Action) {
        let mut state = self.inner.write().await;
        state
            .rules
            .entry(RuleKey { role: role.into(), object: object.into() })
            .or_default()
            .insert(action);
    }

    /// Revoke a previously granted rule.
    pub async fn remove_rule(&self, role: &str, object: &str, action: Action) {
        let mut state = self.inner.write().await;
        if let Some(actions) = state.rules.get_mut(&RuleKey { role: role.to_string(), object: object.to_string() }) {
            actions.remove(&action);
        }
    }

    /// Assign `role` to `user_id`.
    pub async fn add_role_for_user(&self, user_id: impl Into<String>, role: impl Into<String>) {
        let mut state = self.inner.write().await;
        state.roles.entry(user_id.into()).or_default().insert(role.into());
    }

    /// Revoke `role` from `user_id`.
    pub async fn remove_role_for_user(&self, user_id: &str, role: &str) {
        let mut state = self.inner.write().await;
        if let Some(roles) = state.roles.get_mut(user_id) {
            roles.remove(role);
        }
    }

    /// List the roles assigned to `user_id` (empty if none).
    pub async fn roles_for_user(&self, user_id: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .roles
            .get(user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace all rules and role assignments with a freshly loaded policy
    /// document, e.g. read from disk.
    pub async fn reload(&self, document: PolicyDocument) {
        let mut state = self.inner.write().await;
        state.rules.clear();
        state.roles.clear();
        for grant in document.rules {
            state
                .rules
                .entry(RuleKey { role: grant.role, object: grant.object })
                .or_default()
                .extend(grant.actions);
        }
        for assignment in document.role_assignments {
            state.roles.entry(assignment.user_id).or_default().extend(assignment.roles);
        }
    }

    /// Snapshot the current rules and role assignments, e.g. to persist to
    /// disk.
    pub async fn save(&self) -> PolicyDocument {
        let state = self.inner.read().await;
        PolicyDocument {
            rules: state
                .rules
                .iter()
                .map(|(key, actions)| PolicyGrant {
                    role: key.role.clone(),
                    object: key.object.clone(),
                    actions: actions.iter().copied().collect(),
                })
                .collect(),
            role_assignments: state
                .roles
                .iter()
                .map(|(user_id, roles)| RoleAssignment {
                    user_id: user_id.clone(),
                    roles: roles.iter().cloned().collect(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Policy for RuleBased {
    async fn check(&self, auth: &AuthContext, kind: &str, action: Action) -> Decision {
        let state = self.inner.read().await;
        let assigned_roles = state.roles.get(&auth.user_id);
        let has_role = |role: &str| {
            assigned_roles.is_some_and(|roles| roles.contains(role)) || auth.roles.iter().any(|r| r == role)
        };

        for (key, actions) in &state.rules {
            if !actions.contains(&action) {
                continue;
            }
            if key.object != "*" && key.object != kind {
                continue;
            }
            if has_role(&key.role) {
                return Decision::allow(format!("role '{}' grants {:?} on '{}'", key.role, action, key.object));
            }
        }
        Decision::deny(format!("no rule grants {action:?} on '{kind}' to user '{}'", auth.user_id))
    }
}

/// A serializable snapshot of a [`RuleBased`] engine's state, for
/// `reload`/`save`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Role/object/action grants.
    #[serde(default)]
    pub rules: Vec<PolicyGrant>,
    /// User-to-role assignments.
    #[serde(default)]
    pub role_assignments: Vec<RoleAssignment>,
}

/// One `(role, object, actions)` grant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyGrant {
    /// The role this grant applies to.
    pub role: String,
    /// The resource kind, or `"*"` for all kinds.
    pub object: String,
    /// Actions granted.
    pub actions: Vec<Action>,
}

/// One user's role assignments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// The user this assignment applies to.
    pub user_id: String,
    /// Roles assigned to the user.
    pub roles: Vec<String>,
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        serializer.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "read" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(serde::de::Error::custom(format!("unknown action '{other}'"))),
        }
    }
}

/// Registry mapping resource kind to the [`Policy`] that guards it, with a
/// fallback used for unregistered kinds.
pub struct PolicyRegistry {
    policies: RwLock<BTreeMap<String, std::sync::Arc<dyn Policy>>>,
    default: std::sync::Arc<dyn Policy>,
}

impl PolicyRegistry {
    /// Build a registry that falls back to `default` for any kind without an
    /// explicit registration.
    #[must_use]
    pub fn new(default: std::sync::Arc<dyn Policy>) -> Self {
        Self { policies: RwLock::new(BTreeMap::new()), default }
    }

    /// Register `policy` for `kind`.
    pub async fn register(&self, kind: impl Into<String>, policy: std::sync::Arc<dyn Policy>) {
        self.policies.write().await.insert(kind.into(), policy);
    }

    /// Resolve the policy for `kind`, falling back to the registry's default.
    pub async fn for_kind(&self, kind: &str) -> std::sync::Arc<dyn Policy> {
        self.policies
            .read()
            .await
            .get(kind)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod policy_tests;
