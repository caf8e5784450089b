// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::*;
use crate::context::AppContext;
use crate::events::{EventBus, EventBusConfig};
use crate::policy::{Permissive, PolicyRegistry};
use crate::reconcile::Controller;
use crate::storage::file::FileStorage;
use crate::validation::FieldError;
use crate::version_registry::VersionRegistry;

fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(crate::config::FabricaConfig::default());
    let storage: Arc<dyn crate::storage::Storage> = Arc::new(FileStorage::new(dir.path()));
    let versions = Arc::new(VersionRegistry::new());
    let events = Arc::new(EventBus::new(EventBusConfig::default()));
    let policies = Arc::new(PolicyRegistry::new(Arc::new(Permissive)));
    let reconcile = Arc::new(Controller::new(storage.clone(), events.clone(), 1));
    let context = AppContext::new(config, storage, versions, events, policies, reconcile);

    let mut kinds = BTreeMap::new();
    kinds.insert("devices".to_string(), KindConfig::new("Device", "devices", "v1"));
    let state = AppState { context, kinds: Arc::new(kinds) };
    (dir, state)
}

#[test]
fn kind_config_builder_defaults() {
    let kind = KindConfig::new("Device", "devices", "v1");
    assert!(!kind.supports_versioning);
    assert!(!kind.require_if_match);
    assert!(kind.validator.is_none());

    let kind = kind.with_versioning().require_precondition();
    assert!(kind.supports_versioning);
    assert!(kind.require_if_match);
}

#[tokio::test]
async fn app_state_resolve_known_and_unknown_plural() {
    let (_dir, state) = test_state();
    assert!(state.resolve("devices").is_ok());
    let err = state.resolve("widgets").unwrap_err();
    assert!(matches!(err, FabricaError::NotFound { .. }));
}

#[test]
fn into_response_maps_status_and_validation_details() {
    let response = FabricaError::NotFound { kind: "Device".to_string(), uid: "dev-1".to_string() }.into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let errors = vec![FieldError {
        field: "name".to_string(),
        tag: "required".to_string(),
        value: None,
        message: "name is required".to_string(),
    }];
    let response =
        FabricaError::Validation(crate::errors::ValidationError::Failed(errors)).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn json_response_sets_versioned_content_type() {
    let response = json_response(StatusCode::OK, &serde_json::json!({"ok": true}), "v2");
    let content_type = response.headers().get(axum::http::header::CONTENT_TYPE).unwrap();
    assert_eq!(content_type.to_str().unwrap(), "application/json; version=v2");
}
