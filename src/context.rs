// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the HTTP layer and the reconciliation controller.
//!
//! This module provides the core infrastructure the teacher expressed as
//! `Context`/`Stores`: every handler and reconciler receives an
//! `Arc<AppContext>` with a handle onto every long-lived collaborator
//! (storage, versions, events, policy, reconciliation), instead of each
//! wiring its own.

use std::sync::Arc;

use crate::config::FabricaConfig;
use crate::events::EventBus;
use crate::policy::PolicyRegistry;
use crate::reconcile::Controller;
use crate::storage::Storage;
use crate::version_registry::VersionRegistry;

/// Shared context passed to every HTTP handler and reconciler.
#[derive(Clone)]
pub struct AppContext {
    /// Active configuration, as loaded at startup.
    pub config: Arc<FabricaConfig>,

    /// Kind-agnostic resource storage backend.
    pub storage: Arc<dyn Storage>,

    /// Registry of schema versions and converters, keyed by kind.
    pub versions: Arc<VersionRegistry>,

    /// In-process CloudEvents bus.
    pub events: Arc<EventBus>,

    /// Authorization policies, keyed by kind.
    pub policies: Arc<PolicyRegistry>,

    /// Reconciliation controller.
    pub reconcile: Arc<Controller>,
}

impl AppContext {
    /// Assemble a context from its already-constructed collaborators.
    ///
    /// Kept as a plain constructor (rather than performing I/O itself) so
    /// that tests can build a context over a [`crate::storage::file::FileStorage`]
    /// rooted at a `tempdir`, or any other combination, without touching the
    /// filesystem paths a real deployment would use.
    #[must_use]
    pub fn new(
        config: Arc<FabricaConfig>,
        storage: Arc<dyn Storage>,
        versions: Arc<VersionRegistry>,
        events: Arc<EventBus>,
        policies: Arc<PolicyRegistry>,
        reconcile: Arc<Controller>,
    ) -> Self {
        Self { config, storage, versions, events, policies, reconcile }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
