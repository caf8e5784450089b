// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;
use crate::events::EventBusConfig;
use crate::policy::Permissive;
use crate::storage::file::FileStorage;

#[tokio::test]
async fn new_assembles_all_collaborators() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(FabricaConfig::default());
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path()));
    let versions = Arc::new(VersionRegistry::new());
    versions.register_version("Device", "v1", true, false);
    let events = Arc::new(EventBus::new(EventBusConfig::default()));
    let policies = Arc::new(PolicyRegistry::new(Arc::new(Permissive)));
    let reconcile = Arc::new(Controller::new(storage.clone(), events.clone(), 1));

    let context =
        AppContext::new(config.clone(), storage.clone(), versions.clone(), events, policies, reconcile);

    assert_eq!(context.versions.default_version("Device"), Some("v1".to_string()));
    assert!(context.storage.load_all("Device").await.unwrap().is_empty());
}

#[tokio::test]
async fn clone_shares_the_same_underlying_collaborators() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(FabricaConfig::default());
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path()));
    let versions = Arc::new(VersionRegistry::new());
    let events = Arc::new(EventBus::new(EventBusConfig::default()));
    let policies = Arc::new(PolicyRegistry::new(Arc::new(Permissive)));
    let reconcile = Arc::new(Controller::new(storage.clone(), events.clone(), 1));

    let context = AppContext::new(config, storage, versions, events, policies, reconcile);
    let cloned = context.clone();

    assert!(Arc::ptr_eq(&context.storage, &cloned.storage));
    assert!(Arc::ptr_eq(&context.events, &cloned.events));
}
