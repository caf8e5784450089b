// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::super::{router, KindConfig};
use crate::context::AppContext;
use crate::events::{EventBus, EventBusConfig};
use crate::policy::{Permissive, PolicyRegistry};
use crate::reconcile::Controller;
use crate::storage::file::FileStorage;
use crate::storage::Storage;
use crate::validation::{RuleKind, Validator};
use crate::version_registry::VersionRegistry;

async fn test_router() -> (tempfile::TempDir, axum::Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(crate::config::FabricaConfig::default());
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(dir.path()));
    let versions = Arc::new(VersionRegistry::new());
    versions.register_version("Device", "v1", true, false);
    let events = Arc::new(EventBus::new(EventBusConfig::default()));
    let policies = Arc::new(PolicyRegistry::new(Arc::new(Permissive)));
    let reconcile = Arc::new(Controller::new(storage.clone(), events.clone(), 1));
    let context = AppContext::new(config, storage, versions, events, policies, reconcile);

    let validator = Arc::new(Validator::new().with_rule("model", RuleKind::Required));
    let kind = KindConfig::new("Device", "devices", "v1").with_validator(validator).with_versioning();

    (dir, router(context, vec![kind]))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_then_get_round_trips_the_resource() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-1", "spec": {"model": "x1"}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let uid = created["metadata"]["uid"].as_str().unwrap().to_string();

    let get_req = Request::builder().uri(format!("/devices/{uid}")).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(get_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["spec"]["model"], "x1");
}

#[tokio::test]
async fn create_without_required_spec_field_is_rejected() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-0", "spec": {}}).to_string()))
        .unwrap();
    let response = app.oneshot(create_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"].is_array());
}

#[tokio::test]
async fn get_unknown_uid_is_not_found() {
    let (_dir, app) = test_router().await;
    let req = Request::builder().uri("/devices/does-not-exist").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unregistered_plural_is_not_found() {
    let (_dir, app) = test_router().await;
    let req = Request::builder().uri("/widgets").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_merge_updates_spec_and_reports_changes() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-2", "spec": {"model": "x1", "active": false}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create_req).await.unwrap();
    let created = body_json(response).await;
    let uid = created["metadata"]["uid"].as_str().unwrap().to_string();

    let patch_req = Request::builder()
        .method("PATCH")
        .uri(format!("/devices/{uid}"))
        .header(header::CONTENT_TYPE, "application/merge-patch+json")
        .body(Body::from(json!({"active": true}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(patch_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let changes_header = response.headers().get("x-patch-changes").cloned();
    assert!(changes_header.is_some());
    let patched = body_json(response).await;
    assert_eq!(patched["spec"]["active"], true);
}

#[tokio::test]
async fn patch_with_unsupported_media_type_is_rejected() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-3", "spec": {"model": "x1"}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create_req).await.unwrap();
    let created = body_json(response).await;
    let uid = created["metadata"]["uid"].as_str().unwrap().to_string();

    let patch_req = Request::builder()
        .method("PATCH")
        .uri(format!("/devices/{uid}"))
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from(json!({"active": true}).to_string()))
        .unwrap();
    let response = app.oneshot(patch_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-4", "spec": {}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create_req).await.unwrap();
    let created = body_json(response).await;
    let uid = created["metadata"]["uid"].as_str().unwrap().to_string();

    let delete_req = Request::builder().method("DELETE").uri(format!("/devices/{uid}")).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(delete_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let get_req = Request::builder().uri(format!("/devices/{uid}")).body(Body::empty()).unwrap();
    let response = app.oneshot(get_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn options_advertises_allow_and_accept_patch() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-5", "spec": {}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create_req).await.unwrap();
    let created = body_json(response).await;
    let uid = created["metadata"]["uid"].as_str().unwrap().to_string();

    let options_req = Request::builder().method("OPTIONS").uri(format!("/devices/{uid}")).body(Body::empty()).unwrap();
    let response = app.oneshot(options_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key(header::ALLOW));
    assert!(response.headers().contains_key("accept-patch"));
}

#[tokio::test]
async fn conditional_get_returns_not_modified_for_matching_etag() {
    let (_dir, app) = test_router().await;

    let create_req = Request::builder()
        .method("POST")
        .uri("/devices")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "sensor-6", "spec": {}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create_req).await.unwrap();
    let etag = response.headers().get(header::ETAG).unwrap().to_str().unwrap().to_string();
    let created = body_json(response).await;
    let uid = created["metadata"]["uid"].as_str().unwrap().to_string();

    let get_req = Request::builder()
        .uri(format!("/devices/{uid}"))
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}
