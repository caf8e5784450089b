// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP surface (C10): the axum router that exposes every registered kind
//! through the endpoint table described in `SPEC_FULL.md` §4.10, wiring
//! together version negotiation, conditional requests, the patch engine,
//! policy checks and the event bus.
//!
//! Generalizes the teacher's single metrics-only `Router` (`main.rs`'s
//! `start_metrics_server`) into the full resource API; the
//! request-duration-by-route instrumentation follows the same
//! `tokio::spawn` + `axum::serve` shape the teacher uses for its metrics
//! endpoint.

pub mod handlers;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, MatchedPath, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::errors::{FabricaError, ValidationError};
use crate::policy::AuthContext;
use crate::validation::{FieldError, Validator};

/// Per-kind registration: plural path segment, validator, and policy knobs.
#[derive(Clone)]
pub struct KindConfig {
    /// The kind name, e.g. `Device`, as passed to storage/versions/policy.
    pub kind: String,
    /// The lower-case plural path segment, e.g. `devices`.
    pub plural: String,
    /// `apiVersion` stamped on newly-created resources.
    pub api_version: String,
    /// Declarative (+ optional business) validator run on create/replace/patch.
    pub validator: Option<Arc<Validator>>,
    /// Whether this kind opts into spec-version snapshotting (`/versions`).
    pub supports_versioning: bool,
    /// Whether mutating requests (PUT/PATCH/DELETE) must carry `If-Match`.
    pub require_if_match: bool,
}

impl KindConfig {
    /// A kind with no validator, versioning disabled, and no mandatory
    /// preconditions.
    #[must_use]
    pub fn new(kind: impl Into<String>, plural: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            plural: plural.into(),
            api_version: api_version.into(),
            validator: None,
            supports_versioning: false,
            require_if_match: false,
        }
    }

    /// Attach a validator, builder-style.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Enable spec-version snapshotting, builder-style.
    #[must_use]
    pub fn with_versioning(mut self) -> Self {
        self.supports_versioning = true;
        self
    }

    /// Require `If-Match` on mutating requests, builder-style.
    #[must_use]
    pub fn require_precondition(mut self) -> Self {
        self.require_if_match = true;
        self
    }
}

/// Shared state for every handler: the application context plus the kind
/// table, keyed by plural path segment.
#[derive(Clone)]
pub struct AppState {
    /// Storage, versions, events, policy, reconciliation.
    pub context: AppContext,
    /// Registered kinds, keyed by plural.
    pub kinds: Arc<BTreeMap<String, KindConfig>>,
}

impl AppState {
    fn resolve(&self, plural: &str) -> Result<&KindConfig, FabricaError> {
        self.kinds.get(plural).ok_or_else(|| FabricaError::NotFound {
            kind: plural.to_string(),
            uid: String::new(),
        })
    }
}

/// Build the router over every kind in `kinds`.
#[must_use]
pub fn router(context: AppContext, kinds: Vec<KindConfig>) -> Router {
    let kinds = kinds.into_iter().map(|k| (k.plural.clone(), k)).collect();
    let state = AppState { context, kinds: Arc::new(kinds) };

    Router::new()
        .route("/{plural}", get(handlers::list).post(handlers::create))
        .route(
            "/{plural}/{uid}",
            get(handlers::get_one)
                .put(handlers::replace)
                .patch(handlers::patch_one)
                .delete(handlers::delete_one)
                .options(handlers::options_one),
        )
        .route(
            "/{plural}/{uid}/status",
            put(handlers::replace_status).patch(handlers::patch_status),
        )
        .route("/{plural}/{uid}/versions", get(handlers::list_versions))
        .route(
            "/{plural}/{uid}/versions/{version_id}",
            get(handlers::get_version).delete(handlers::delete_version),
        )
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

async fn track_metrics(matched_path: Option<MatchedPath>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = matched_path.map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let response = next.run(req).await;
    crate::metrics::record_http_request(&method, &route, response.status().as_u16(), start.elapsed());
    response
}

/// Extracts the [`AuthContext`] an upstream authentication layer attaches to
/// the request as an [`axum::Extension`]; anonymous (empty) if none was
/// attached, since this toolkit never parses tokens itself.
pub struct ReqAuth(pub AuthContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ReqAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ReqAuth(parts.extensions.get::<AuthContext>().cloned().unwrap_or_default()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
}

impl IntoResponse for FabricaError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &self {
            FabricaError::Validation(ValidationError::Failed(errors)) => Some(errors.clone()),
            _ => None,
        };
        let body = ErrorBody { error: self.reason().to_string(), details };
        (status, Json::<ErrorBody>(body)).into_response()
    }
}

/// Serialize a JSON-ish payload the same way every handler does, so status
/// codes and the `Content-Type` negotiation header stay consistent.
pub(crate) fn json_response(status: StatusCode, value: &Value, served_version: &str) -> Response {
    let mut response = (status, Json(value.clone())).into_response();
    if let Ok(value) = format!("application/json; version={served_version}").parse() {
        response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
    }
    response
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
