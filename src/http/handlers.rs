// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Handler functions for the endpoint table in `SPEC_FULL.md` §4.10.
//!
//! Every handler follows the same shape: resolve the kind, check policy,
//! negotiate a version, touch storage, publish a lifecycle event on
//! mutation. Conditional-request and patch-dialect handling are delegated
//! to [`crate::conditional`] and [`crate::patch`] respectively.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{json_response, AppState, KindConfig, ReqAuth};
use crate::conditional::{check_conditional_request, compute_etag, CacheControl, ConditionalInfo, ConditionalOutcome};
use crate::errors::{FabricaError, VersionError};
use crate::patch::{apply_patch, compute_patch_changes, PatchType};
use crate::resource::{Resource, Status};
use crate::storage::VersionedStorage;
use crate::version_registry::parse_requested_version;

#[derive(Debug, Deserialize)]
struct CreateRequest {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    spec: Value,
}

fn header_getter(headers: &HeaderMap) -> impl FnMut(&str) -> Option<String> + '_ {
    move |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn requested_version(headers: &HeaderMap) -> Option<String> {
    headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()).and_then(parse_requested_version)
}

/// Resolve the version to serve, falling back to the toolkit's default
/// schema version for kinds that never registered any (rather than failing
/// every request for a kind whose author skipped versioning).
fn resolved_version(state: &AppState, kind: &KindConfig, headers: &HeaderMap) -> Result<String, FabricaError> {
    let requested = requested_version(headers);
    match state.context.versions.resolve(&kind.kind, requested.as_deref()) {
        Ok(v) => Ok(v),
        Err(FabricaError::Version(VersionError::UnknownKind(_))) => {
            Ok(crate::constants::DEFAULT_SCHEMA_VERSION.to_string())
        }
        Err(err) => Err(err),
    }
}

fn extract_last_modified(value: &Value) -> DateTime<Utc> {
    value
        .pointer("/metadata/updatedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn insert_etag(response: &mut Response, etag: &str) {
    if let Ok(value) = etag.parse() {
        response.headers_mut().insert(header::ETAG, value);
    }
}

fn insert_cache_headers(response: &mut Response, etag: &str, last_modified: DateTime<Utc>) {
    insert_etag(response, etag);
    if let Ok(value) = last_modified.to_rfc2822().parse() {
        response.headers_mut().insert(header::LAST_MODIFIED, value);
    }
    let cache_control = CacheControl { private: true, must_revalidate: true, ..Default::default() };
    if let Ok(value) = cache_control.to_header_value().parse() {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    response.headers_mut().insert(header::VARY, HeaderName::from_static("accept").to_string().parse().unwrap());
}

fn not_modified_response(etag: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    insert_etag(&mut response, etag);
    response
}

fn detect_patch_type_strict(content_type: Option<&axum::http::HeaderValue>) -> Result<PatchType, FabricaError> {
    let Some(value) = content_type else {
        return Ok(PatchType::Merge);
    };
    let raw = value
        .to_str()
        .map_err(|_| FabricaError::UnsupportedMediaType("<invalid content-type>".to_string()))?;
    let base = raw.split(';').next().unwrap_or("").trim().to_lowercase();
    match base.as_str() {
        "application/merge-patch+json" | "" => Ok(PatchType::Merge),
        "application/json-patch+json" => Ok(PatchType::JsonPatch),
        "application/shorthand-patch+json" => Ok(PatchType::Shorthand),
        other => Err(FabricaError::UnsupportedMediaType(other.to_string())),
    }
}

fn check_precondition_for_mutation(headers: &HeaderMap, kind: &KindConfig, resource: &Resource) -> Result<(), FabricaError> {
    let info = ConditionalInfo::extract(header_getter(headers));
    if kind.require_if_match && info.if_match.is_none() {
        return Err(FabricaError::PreconditionRequired);
    }
    let bytes = serde_json::to_vec(resource).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    let etag = compute_etag(&bytes);
    match check_conditional_request(&info, "PUT", &etag, resource.metadata.updated_at) {
        ConditionalOutcome::PreconditionFailed => Err(FabricaError::PreconditionFailed),
        ConditionalOutcome::NotModified | ConditionalOutcome::Proceed => Ok(()),
    }
}

async fn load_resource(state: &AppState, kind: &str, uid: &str) -> Result<Resource, FabricaError> {
    let value = state.context.storage.load(kind, uid).await?;
    serde_json::from_value(value).map_err(|e| FabricaError::InvalidData(e.to_string()))
}

/// For kinds that opt into spec-versioning, freeze `resource`'s spec (as it
/// stands after the mutation that's about to be persisted) into an
/// immutable snapshot, and point `status.version` at it. Called once per
/// successful spec mutation (create, replace, patch), per Invariant 5: every
/// such mutation produces a snapshot and advances `status.version`.
///
/// The snapshot holds only `{ createdAt, metadataSubset, spec }`, never
/// `status`, matching the wire shape in `SPEC_FULL.md` §6; `versionId` is
/// allocated by storage and reported back in the `/versions/{id}` response.
async fn snapshot_spec(state: &AppState, kind: &KindConfig, resource: &mut Resource) -> Result<(), FabricaError> {
    if !kind.supports_versioning {
        return Ok(());
    }
    let snapshot = json!({
        "createdAt": Utc::now(),
        "metadataSubset": {
            "uid": resource.metadata.uid,
            "name": resource.metadata.name,
            "labels": resource.metadata.labels,
            "annotations": resource.metadata.annotations,
        },
        "spec": resource.spec,
    });
    let version_id = state.context.storage.save_snapshot(&kind.kind, &resource.metadata.uid, snapshot).await?;
    resource.status.version = Some(version_id);
    Ok(())
}

async fn persist_and_respond(
    state: &AppState,
    kind: &KindConfig,
    resource: Resource,
    verb: &str,
    status: StatusCode,
) -> Result<Response, FabricaError> {
    let value = serde_json::to_value(&resource).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    state.context.storage.save(&kind.kind, &resource.metadata.uid, value.clone()).await?;
    state.context.events.publish_lifecycle_event(&resource, verb).await;

    let bytes = serde_json::to_vec(&value).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    let etag = compute_etag(&bytes);
    let mut response = json_response(status, &value, &resource.schema_version);
    insert_etag(&mut response, &etag);
    Ok(response)
}

pub async fn list(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    auth: ReqAuth,
    headers: HeaderMap,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?;
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_list(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let served_version = resolved_version(&state, kind, &headers)?;
    let versioned = VersionedStorage::new(state.context.storage.as_ref(), &state.context.versions);
    let items = versioned.load_all_with_version(&kind.kind, &served_version).await?;

    let body = Value::Array(items);
    let bytes = serde_json::to_vec(&body).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    let etag = compute_etag(&bytes);

    let info = ConditionalInfo::extract(header_getter(&headers));
    match check_conditional_request(&info, "GET", &etag, Utc::now()) {
        ConditionalOutcome::NotModified => return Ok(not_modified_response(&etag)),
        ConditionalOutcome::PreconditionFailed => return Err(FabricaError::PreconditionFailed),
        ConditionalOutcome::Proceed => {}
    }

    let mut response = json_response(StatusCode::OK, &body, &served_version);
    insert_cache_headers(&mut response, &etag, Utc::now());
    Ok(response)
}

pub async fn create(
    State(state): State<AppState>,
    Path(plural): Path<String>,
    auth: ReqAuth,
    Json(req): Json<CreateRequest>,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?.clone();
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_create(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    if let Some(validator) = &kind.validator {
        validator.validate(&req.spec, None).await?;
    }

    let schema_version = state
        .context
        .versions
        .resolve(&kind.kind, None)
        .unwrap_or_else(|_| crate::constants::DEFAULT_SCHEMA_VERSION.to_string());

    let mut resource = Resource::new(&kind.api_version, &kind.kind, &schema_version, &req.name, req.spec);
    resource.metadata.labels = req.labels;
    resource.metadata.annotations = req.annotations;

    if state.context.storage.exists(&kind.kind, &resource.metadata.uid).await? {
        return Err(FabricaError::AlreadyExists { kind: kind.kind.clone(), uid: resource.metadata.uid.clone() });
    }

    snapshot_spec(&state, &kind, &mut resource).await?;

    crate::metrics::record_resource_created(&kind.kind);
    persist_and_respond(&state, &kind, resource, "created", StatusCode::CREATED).await
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
    headers: HeaderMap,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?;
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_get(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let served_version = resolved_version(&state, kind, &headers)?;
    let versioned = VersionedStorage::new(state.context.storage.as_ref(), &state.context.versions);
    let (value, _actual_version) = versioned.load_with_version(&kind.kind, &uid, &served_version).await?;

    let bytes = serde_json::to_vec(&value).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    let etag = compute_etag(&bytes);
    let last_modified = extract_last_modified(&value);

    let info = ConditionalInfo::extract(header_getter(&headers));
    match check_conditional_request(&info, "GET", &etag, last_modified) {
        ConditionalOutcome::NotModified => return Ok(not_modified_response(&etag)),
        ConditionalOutcome::PreconditionFailed => return Err(FabricaError::PreconditionFailed),
        ConditionalOutcome::Proceed => {}
    }

    let mut response = json_response(StatusCode::OK, &value, &served_version);
    insert_cache_headers(&mut response, &etag, last_modified);
    Ok(response)
}

pub async fn replace(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
    headers: HeaderMap,
    Json(spec): Json<Value>,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?.clone();
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_update(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let mut resource = load_resource(&state, &kind.kind, &uid).await?;
    check_precondition_for_mutation(&headers, &kind, &resource)?;

    if let Some(validator) = &kind.validator {
        validator.validate(&spec, None).await?;
    }

    resource.spec = spec;
    resource.bump_generation();
    snapshot_spec(&state, &kind, &mut resource).await?;

    crate::metrics::record_resource_updated(&kind.kind);
    persist_and_respond(&state, &kind, resource, "updated", StatusCode::OK).await
}

pub async fn patch_one(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
    headers: HeaderMap,
    Json(patch_doc): Json<Value>,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?.clone();
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_update(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let mut resource = load_resource(&state, &kind.kind, &uid).await?;
    check_precondition_for_mutation(&headers, &kind, &resource)?;

    let patch_type = detect_patch_type_strict(headers.get(header::CONTENT_TYPE))?;
    let before_spec = resource.spec.clone();
    let new_spec = apply_patch(&resource.spec, &patch_doc, patch_type)?;

    if let Some(validator) = &kind.validator {
        validator.validate(&new_spec, None).await?;
    }

    resource.spec = new_spec;
    resource.bump_generation();
    let changes = compute_patch_changes(&before_spec, &resource.spec);
    snapshot_spec(&state, &kind, &mut resource).await?;

    crate::metrics::record_resource_updated(&kind.kind);
    let mut response = persist_and_respond(&state, &kind, resource, "patched", StatusCode::OK).await?;
    if !changes.is_empty() {
        if let Ok(value) = changes.join(",").parse() {
            response.headers_mut().insert(HeaderName::from_static("x-patch-changes"), value);
        }
    }
    Ok(response)
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
    headers: HeaderMap,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?;
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_delete(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let resource = load_resource(&state, &kind.kind, &uid).await?;
    check_precondition_for_mutation(&headers, kind, &resource)?;

    state.context.storage.delete(&kind.kind, &uid).await?;
    state.context.events.publish_lifecycle_event(&resource, "deleted").await;
    crate::metrics::record_resource_deleted(&kind.kind);
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn options_one(
    State(state): State<AppState>,
    Path((plural, _uid)): Path<(String, String)>,
) -> Result<Response, FabricaError> {
    state.resolve(&plural)?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().insert(header::ALLOW, "GET, PUT, PATCH, DELETE, OPTIONS".parse().unwrap());
    response.headers_mut().insert(
        HeaderName::from_static("accept-patch"),
        "application/merge-patch+json, application/json-patch+json, application/shorthand-patch+json"
            .parse()
            .unwrap(),
    );
    Ok(response)
}

pub async fn replace_status(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
    headers: HeaderMap,
    Json(status_body): Json<Value>,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?.clone();
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_update(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let mut resource = load_resource(&state, &kind.kind, &uid).await?;
    check_precondition_for_mutation(&headers, &kind, &resource)?;

    let preserved_version = resource.status.version.clone();
    let mut new_status: Status = serde_json::from_value(status_body).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    new_status.version = preserved_version;
    resource.status = new_status;

    crate::metrics::record_resource_updated(&kind.kind);
    persist_and_respond(&state, &kind, resource, "updated", StatusCode::OK).await
}

pub async fn patch_status(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
    headers: HeaderMap,
    Json(patch_doc): Json<Value>,
) -> Result<Response, FabricaError> {
    let kind = state.resolve(&plural)?.clone();
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_update(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }

    let mut resource = load_resource(&state, &kind.kind, &uid).await?;
    check_precondition_for_mutation(&headers, &kind, &resource)?;

    let patch_type = detect_patch_type_strict(headers.get(header::CONTENT_TYPE))?;
    let preserved_version = resource.status.version.clone();
    let before_status = serde_json::to_value(&resource.status).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    let patched_status = apply_patch(&before_status, &patch_doc, patch_type)?;
    let mut new_status: Status = serde_json::from_value(patched_status).map_err(|e| FabricaError::InvalidData(e.to_string()))?;
    new_status.version = preserved_version;
    resource.status = new_status;

    crate::metrics::record_resource_updated(&kind.kind);
    persist_and_respond(&state, &kind, resource, "updated", StatusCode::OK).await
}

pub async fn list_versions(
    State(state): State<AppState>,
    Path((plural, uid)): Path<(String, String)>,
    auth: ReqAuth,
) -> Result<Json<Vec<String>>, FabricaError> {
    let kind = state.resolve(&plural)?;
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_get(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }
    if !kind.supports_versioning {
        return Err(FabricaError::InvalidData(format!("kind '{}' does not support spec versioning", kind.kind)));
    }

    let ids = state.context.storage.list_snapshots(&kind.kind, &uid).await?;
    Ok(Json(ids))
}

pub async fn get_version(
    State(state): State<AppState>,
    Path((plural, uid, version_id)): Path<(String, String, String)>,
    auth: ReqAuth,
) -> Result<Json<Value>, FabricaError> {
    let kind = state.resolve(&plural)?;
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_get(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }
    if !kind.supports_versioning {
        return Err(FabricaError::InvalidData(format!("kind '{}' does not support spec versioning", kind.kind)));
    }

    let mut value = state.context.storage.load_snapshot(&kind.kind, &uid, &version_id).await?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("versionId".to_string(), Value::String(version_id));
    }
    Ok(Json(value))
}

pub async fn delete_version(
    State(state): State<AppState>,
    Path((plural, uid, version_id)): Path<(String, String, String)>,
    auth: ReqAuth,
) -> Result<StatusCode, FabricaError> {
    let kind = state.resolve(&plural)?;
    let policy = state.context.policies.for_kind(&kind.kind).await;
    let decision = policy.can_delete(&auth.0, &kind.kind).await;
    if !decision.allowed {
        return Err(FabricaError::Forbidden(decision.reason));
    }
    if !kind.supports_versioning {
        return Err(FabricaError::InvalidData(format!("kind '{}' does not support spec versioning", kind.kind)));
    }

    state.context.storage.delete_snapshot(&kind.kind, &uid, &version_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod handlers_tests;
