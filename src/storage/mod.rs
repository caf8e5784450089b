// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Storage abstraction: type-agnostic CRUD keyed by `(kind, uid)`, with
//! version-aware load/save that converts through the [`crate::version_registry`]
//! when the caller's requested version differs from what's on disk.
//!
//! Grounded on the version-gated CRUD shape in `other_examples`'
//! scim-server `EnhancedResourceProvider`/`VersionedResource`, and on the
//! teacher's locking conventions (`context.rs`'s single shared state, guarded
//! access pattern).

pub mod file;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::FabricaError;
use crate::version_registry::VersionRegistry;

/// Kind-agnostic, uid-addressed byte storage.
///
/// Implementations must serialize concurrent writers per `(kind, uid)` while
/// allowing concurrent readers, and must never return a torn/partial write.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load every resource of `kind`, skipping (with a warning) any entry
    /// that fails to parse as JSON.
    async fn load_all(&self, kind: &str) -> Result<Vec<Value>, FabricaError>;

    /// Load one resource by `(kind, uid)`.
    ///
    /// # Errors
    /// Returns [`FabricaError::NotFound`] if no such resource exists.
    async fn load(&self, kind: &str, uid: &str) -> Result<Value, FabricaError>;

    /// Create-or-replace a resource's bytes atomically.
    async fn save(&self, kind: &str, uid: &str, value: Value) -> Result<(), FabricaError>;

    /// Delete a resource.
    ///
    /// # Errors
    /// Returns [`FabricaError::NotFound`] if no such resource exists.
    async fn delete(&self, kind: &str, uid: &str) -> Result<(), FabricaError>;

    /// Whether a resource exists.
    async fn exists(&self, kind: &str, uid: &str) -> Result<bool, FabricaError>;

    /// List the uids of every resource of `kind`.
    async fn list(&self, kind: &str) -> Result<Vec<String>, FabricaError>;

    /// Persist an immutable spec snapshot for `(kind, uid)`, returning its
    /// allocated `versionId`.
    async fn save_snapshot(&self, kind: &str, uid: &str, snapshot: Value) -> Result<String, FabricaError>;

    /// Load a specific snapshot by id.
    async fn load_snapshot(&self, kind: &str, uid: &str, version_id: &str) -> Result<Value, FabricaError>;

    /// List snapshot ids for `(kind, uid)`, oldest first.
    async fn list_snapshots(&self, kind: &str, uid: &str) -> Result<Vec<String>, FabricaError>;

    /// Delete a snapshot by id.
    async fn delete_snapshot(&self, kind: &str, uid: &str, version_id: &str) -> Result<(), FabricaError>;

    /// Close the backend. Idempotent; subsequent calls to any other method
    /// must fail with [`FabricaError::BackendUnavailable`].
    async fn close(&self) -> Result<(), FabricaError>;
}

/// Adds version-aware load/save on top of a plain [`Storage`] backend,
/// converting through a [`VersionRegistry`] when the caller's requested
/// version differs from the storage (on-disk) version.
pub struct VersionedStorage<'a, S: Storage + ?Sized> {
    backend: &'a S,
    registry: &'a VersionRegistry,
}

impl<'a, S: Storage + ?Sized> VersionedStorage<'a, S> {
    /// Wrap `backend` with version conversion driven by `registry`.
    #[must_use]
    pub fn new(backend: &'a S, registry: &'a VersionRegistry) -> Self {
        Self { backend, registry }
    }

    fn storage_version(value: &Value) -> String {
        value
            .get("schemaVersion")
            .and_then(Value::as_str)
            .unwrap_or("v1")
            .to_string()
    }

    /// Load one resource, converting it to `requested_version` if it differs
    /// from the version it was stored in. Returns the resource and the
    /// version it's actually encoded in (== `requested_version` on success).
    pub async fn load_with_version(
        &self,
        kind: &str,
        uid: &str,
        requested_version: &str,
    ) -> Result<(Value, String), FabricaError> {
        let stored = self.backend.load(kind, uid).await?;
        let stored_version = Self::storage_version(&stored);
        if stored_version == requested_version {
            return Ok((stored, stored_version));
        }
        let converted = self
            .registry
            .convert(kind, stored, &stored_version, requested_version)?;
        Ok((converted, requested_version.to_string()))
    }

    /// Load every resource of `kind`, converting each to `requested_version`;
    /// resources that fail to convert are dropped (best-effort), matching
    /// `LoadAll`'s skip-and-warn semantics.
    pub async fn load_all_with_version(
        &self,
        kind: &str,
        requested_version: &str,
    ) -> Result<Vec<Value>, FabricaError> {
        let all = self.backend.load_all(kind).await?;
        let mut out = Vec::with_capacity(all.len());
        for value in all {
            let stored_version = Self::storage_version(&value);
            if stored_version == requested_version {
                out.push(value);
                continue;
            }
            match self
                .registry
                .convert(kind, value, &stored_version, requested_version)
            {
                Ok(converted) => out.push(converted),
                Err(err) => {
                    tracing::warn!(kind, uid = ?"unknown", error = %err, "dropping resource that failed version conversion");
                }
            }
        }
        Ok(out)
    }

    /// Save a resource supplied in `supplied_version`, converting it down to
    /// the kind's storage version first if they differ.
    pub async fn save_with_version(
        &self,
        kind: &str,
        uid: &str,
        value: Value,
        supplied_version: &str,
        storage_version: &str,
    ) -> Result<(), FabricaError> {
        let to_store = if supplied_version == storage_version {
            value
        } else {
            self.registry
                .convert(kind, value, supplied_version, storage_version)?
        };
        self.backend.save(kind, uid, to_store).await
    }
}
