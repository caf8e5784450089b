// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management for the deletion lifecycle.
//!
//! Adapted from the teacher's `reconcilers::finalizers` module, which drove
//! the same add/remove/cleanup choreography through `kube`'s `Api::patch`.
//! Here the resource is a plain [`crate::resource::Resource`] and
//! persistence goes through the [`crate::storage::Storage`] trait instead.

use async_trait::async_trait;
use tracing::info;

use crate::errors::FabricaError;
use crate::resource::Resource;
use crate::storage::Storage;

/// Resource-kind-specific cleanup run before a finalizer is removed.
///
/// If `cleanup` returns an error, the finalizer is left in place and
/// deletion stays blocked until a later reconcile attempt succeeds.
#[async_trait]
pub trait FinalizerCleanup: Send + Sync {
    /// Perform cleanup for `resource`. Returning an error blocks finalizer
    /// removal (and therefore deletion) until this succeeds.
    async fn cleanup(&self, resource: &Resource) -> anyhow::Result<()>;
}

/// Add `finalizer` to `resource` if not already present. Returns whether it
/// was added.
pub fn ensure_finalizer(resource: &mut Resource, finalizer: &str) -> bool {
    if resource.metadata.finalizers.iter().any(|f| f == finalizer) {
        return false;
    }
    info!(kind = %resource.kind, uid = %resource.metadata.uid, finalizer, "adding finalizer");
    resource.metadata.finalizers.push(finalizer.to_string());
    true
}

/// Remove `finalizer` from `resource` if present. Returns whether it was
/// removed.
pub fn remove_finalizer(resource: &mut Resource, finalizer: &str) -> bool {
    let before = resource.metadata.finalizers.len();
    resource.metadata.finalizers.retain(|f| f != finalizer);
    let removed = resource.metadata.finalizers.len() != before;
    if removed {
        info!(kind = %resource.kind, uid = %resource.metadata.uid, finalizer, "removed finalizer");
    }
    removed
}

/// Orchestrate one deletion step: when `resource` is terminating and still
/// carries `finalizer`, run `cleanup`, remove the finalizer, and persist the
/// result via `storage`.
///
/// Returns `true` when `resource` is free of all finalizers afterward (the
/// caller should delete it from storage); `false` when finalizers remain or
/// `resource` isn't terminating.
///
/// # Errors
/// Propagates cleanup failures and storage I/O errors; on either, the
/// finalizer remains and deletion stays blocked.
pub async fn handle_deletion(
    storage: &dyn Storage,
    resource: &mut Resource,
    finalizer: &str,
    cleanup: &dyn FinalizerCleanup,
) -> Result<bool, FabricaError> {
    if !resource.metadata.is_terminating() {
        return Ok(false);
    }

    if resource.metadata.finalizers.iter().any(|f| f == finalizer) {
        info!(kind = %resource.kind, uid = %resource.metadata.uid, "running cleanup before finalizer removal");
        cleanup.cleanup(resource).await.map_err(FabricaError::from)?;
        remove_finalizer(resource, finalizer);
        let uid = resource.metadata.uid.clone();
        let value = serde_json::to_value(&*resource).map_err(|err| FabricaError::InvalidData(err.to_string()))?;
        storage.save(&resource.kind, &uid, value).await?;
    }

    Ok(resource.metadata.finalizers.is_empty())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
