// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! RFC 7232 conditional-request engine: ETag generation and the
//! `If-Match`/`If-None-Match`/`If-Modified-Since`/`If-Unmodified-Since`
//! precedence chain.
//!
//! Grounded on the version-gated CRUD shape in `other_examples`'
//! scim-server `EnhancedResourceProvider` (optimistic-concurrency via a
//! supplied "expected version"), adapted to HTTP precondition headers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Compute a strong ETag for `bytes`: a quoted, base64-encoded SHA-256
/// digest of the content.
#[must_use]
pub fn compute_etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("\"{}\"", BASE64.encode(digest))
}

/// Compute a weak ETag (`W/"..."`) for `bytes`.
#[must_use]
pub fn compute_weak_etag(bytes: &[u8]) -> String {
    format!("W/{}", compute_etag(bytes))
}

/// `Cache-Control` directive builder.
#[derive(Clone, Debug, Default)]
pub struct CacheControl {
    /// `public` marks the response cacheable by shared caches.
    pub public: bool,
    /// `private` marks the response cacheable only by the end client.
    pub private: bool,
    /// `max-age=<seconds>`.
    pub max_age: Option<u64>,
    /// `s-maxage=<seconds>` for shared caches.
    pub s_maxage: Option<u64>,
    /// `must-revalidate`.
    pub must_revalidate: bool,
    /// `no-cache`.
    pub no_cache: bool,
    /// `no-store`.
    pub no_store: bool,
}

impl CacheControl {
    /// Render this configuration as a `Cache-Control` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut parts = Vec::new();
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.public {
            parts.push("public".to_string());
        }
        if self.private {
            parts.push("private".to_string());
        }
        if let Some(age) = self.max_age {
            parts.push(format!("max-age={age}"));
        }
        if let Some(age) = self.s_maxage {
            parts.push(format!("s-maxage={age}"));
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        parts.join(", ")
    }
}

/// Conditional headers extracted from an incoming request.
#[derive(Clone, Debug, Default)]
pub struct ConditionalInfo {
    /// `If-Match` header value, verbatim.
    pub if_match: Option<String>,
    /// `If-None-Match` header value, verbatim.
    pub if_none_match: Option<String>,
    /// Parsed `If-Modified-Since`.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// Parsed `If-Unmodified-Since`.
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl ConditionalInfo {
    /// Extract conditional headers by name lookup, given a case-insensitive
    /// header accessor.
    pub fn extract(mut get_header: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            if_match: get_header("if-match"),
            if_none_match: get_header("if-none-match"),
            if_modified_since: get_header("if-modified-since")
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|d| d.with_timezone(&Utc)),
            if_unmodified_since: get_header("if-unmodified-since")
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }
}

/// Outcome of evaluating the conditional-request precedence chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// No conditional header applied; proceed with the normal response.
    Proceed,
    /// `304 Not Modified`; caller must stop and return an empty body.
    NotModified,
    /// `412 Precondition Failed`; caller must stop and reject the write.
    PreconditionFailed,
}

fn etag_matches(header_value: &str, current: &str) -> bool {
    if header_value.trim() == "*" {
        return true;
    }
    header_value
        .split(',')
        .map(str::trim)
        .any(|candidate| strip_weak(candidate) == strip_weak(current))
}

fn strip_weak(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}

/// Whether `method` is a "safe" method for conditional-GET purposes.
#[must_use]
pub fn is_safe_method(method: &str) -> bool {
    matches!(method.to_uppercase().as_str(), "GET" | "HEAD")
}

/// Evaluate the RFC 7232 precedence chain against the resource's current
/// `etag`/`last_modified`.
///
/// Order: `If-Match` -> `If-Unmodified-Since` -> `If-None-Match` ->
/// `If-Modified-Since`.
#[must_use]
pub fn check_conditional_request(
    info: &ConditionalInfo,
    method: &str,
    current_etag: &str,
    last_modified: DateTime<Utc>,
) -> ConditionalOutcome {
    if let Some(if_match) = &info.if_match {
        if !etag_matches(if_match, current_etag) {
            return ConditionalOutcome::PreconditionFailed;
        }
    }

    if let Some(if_unmodified_since) = info.if_unmodified_since {
        if last_modified > if_unmodified_since {
            return ConditionalOutcome::PreconditionFailed;
        }
    }

    if let Some(if_none_match) = &info.if_none_match {
        let matches = etag_matches(if_none_match, current_etag);
        if matches {
            return if is_safe_method(method) {
                ConditionalOutcome::NotModified
            } else {
                ConditionalOutcome::PreconditionFailed
            };
        }
    } else if let Some(if_modified_since) = info.if_modified_since {
        if is_safe_method(method) && last_modified <= if_modified_since {
            return ConditionalOutcome::NotModified;
        }
    }

    ConditionalOutcome::Proceed
}

#[cfg(test)]
#[path = "conditional_tests.rs"]
mod conditional_tests;
