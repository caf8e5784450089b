// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unified error hierarchy for the Fabrica toolkit.
//!
//! Every component returns a narrow, component-specific error where it makes
//! sense (see [`ValidationError`], [`VersionError`]), and all of them convert
//! into [`FabricaError`] so the HTTP layer has a single place to map error
//! kinds to status codes.

use thiserror::Error;

/// Errors raised while validating a resource (see [`crate::validation`]).
#[derive(Debug, Error)]
pub enum ValidationError {
    /// One or more declarative or custom rules failed.
    #[error("validation failed: {0:?}")]
    Failed(Vec<crate::validation::FieldError>),
}

/// Errors raised while converting between schema versions (see
/// [`crate::version_registry`]).
#[derive(Debug, Error)]
pub enum VersionError {
    /// The requested version is not registered for this kind.
    #[error("unsupported schema version '{requested}' for kind '{kind}', supported: {supported:?}")]
    NotAcceptable {
        /// Kind the caller asked about.
        kind: String,
        /// Version string the caller requested.
        requested: String,
        /// Versions actually registered for this kind.
        supported: Vec<String>,
    },

    /// No converter exists between two registered versions.
    #[error("no converter from '{from}' to '{to}' for kind '{kind}'")]
    NoConverter {
        /// Kind being converted.
        kind: String,
        /// Source version.
        from: String,
        /// Target version.
        to: String,
    },

    /// The kind itself has never been registered.
    #[error("unknown kind '{0}'")]
    UnknownKind(String),
}

/// Top-level error type returned by every Fabrica component.
///
/// Mirrors the teacher's `DnsError` composition: each component gets its own
/// `thiserror` enum, and `FabricaError` folds them together with
/// `#[error(transparent)] #[from]` so call sites can propagate with `?`.
#[derive(Debug, Error)]
pub enum FabricaError {
    /// No resource exists for the given kind/uid.
    #[error("{kind} '{uid}' not found")]
    NotFound {
        /// Kind of the missing resource.
        kind: String,
        /// UID that was looked up.
        uid: String,
    },

    /// A create collided with an existing uid.
    #[error("{kind} '{uid}' already exists")]
    AlreadyExists {
        /// Kind of the colliding resource.
        kind: String,
        /// UID that already exists.
        uid: String,
    },

    /// The request body was not valid JSON, or a uid was malformed/empty.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Declarative or custom validation rules rejected the resource.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A PATCH document itself was malformed.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// A well-formed patch could not be applied (e.g. JSON Patch `test`
    /// failed, or a path did not exist for `remove`/`replace`).
    #[error("could not apply patch: {0}")]
    ApplyFailure(String),

    /// A patch changed a path outside its declared field mask.
    #[error("patch touched path '{path}' outside of field mask")]
    FieldMaskViolation {
        /// The offending JSON Pointer path.
        path: String,
    },

    /// `If-Match` / `If-Unmodified-Since` precondition failed.
    #[error("precondition failed")]
    PreconditionFailed,

    /// The operation requires a conditional header that was not supplied.
    #[error("precondition required")]
    PreconditionRequired,

    /// The requested schema version is not supported for this kind.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The request's `Content-Type` is not a supported PATCH media type.
    #[error("unsupported media type '{0}'")]
    UnsupportedMediaType(String),

    /// No (or an invalid) authentication context was supplied.
    #[error("unauthorized")]
    Unauthorized,

    /// The policy engine denied the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The storage backend failed (I/O, lock poisoning, corrupt bytes).
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A concurrent-update collision that is not precondition-related.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl FabricaError {
    /// Map this error to the HTTP status code prescribed by the error-kind
    /// table (spec §7).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            FabricaError::NotFound { .. } => 404,
            FabricaError::AlreadyExists { .. } => 409,
            FabricaError::InvalidData(_) => 400,
            FabricaError::Validation(_) => 400,
            FabricaError::InvalidPatch(_) => 400,
            FabricaError::ApplyFailure(_) => 422,
            FabricaError::FieldMaskViolation { .. } => 422,
            FabricaError::PreconditionFailed => 412,
            FabricaError::PreconditionRequired => 428,
            FabricaError::Version(VersionError::NotAcceptable { .. }) => 406,
            FabricaError::Version(_) => 500,
            FabricaError::UnsupportedMediaType(_) => 415,
            FabricaError::Unauthorized => 401,
            FabricaError::Forbidden(_) => 403,
            FabricaError::BackendUnavailable(_) => 500,
            FabricaError::Conflict(_) => 409,
        }
    }

    /// A short machine-readable reason string, analogous to the teacher's
    /// `status_reason()` on `DnsError`.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            FabricaError::NotFound { .. } => "NotFound",
            FabricaError::AlreadyExists { .. } => "AlreadyExists",
            FabricaError::InvalidData(_) => "InvalidData",
            FabricaError::Validation(_) => "ValidationFailed",
            FabricaError::InvalidPatch(_) => "InvalidPatch",
            FabricaError::ApplyFailure(_) => "ApplyFailure",
            FabricaError::FieldMaskViolation { .. } => "FieldMaskViolation",
            FabricaError::PreconditionFailed => "PreconditionFailed",
            FabricaError::PreconditionRequired => "PreconditionRequired",
            FabricaError::Version(VersionError::NotAcceptable { .. }) => "NotAcceptable",
            FabricaError::Version(_) => "VersionError",
            FabricaError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            FabricaError::Unauthorized => "Unauthorized",
            FabricaError::Forbidden(_) => "Forbidden",
            FabricaError::BackendUnavailable(_) => "BackendUnavailable",
            FabricaError::Conflict(_) => "Conflict",
        }
    }

    /// Whether retrying the same operation later might succeed, used by the
    /// reconciliation controller to decide whether to requeue.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, FabricaError::BackendUnavailable(_))
    }
}

impl From<anyhow::Error> for FabricaError {
    fn from(err: anyhow::Error) -> Self {
        FabricaError::BackendUnavailable(err.to_string())
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
