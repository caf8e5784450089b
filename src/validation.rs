// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Declarative validation engine.
//!
//! Rules are attached to resource fields and evaluated against a
//! [`serde_json::Value`], producing a flat list of [`FieldError`]. Built-in
//! rules cover the standard set (required/min/max/len/oneof/email/url/ip/mac)
//! plus the Kubernetes-flavored rules named in `SPEC_FULL.md` §4.2.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FabricaError, ValidationError};

/// A single failed rule, using the field's external (serialized) name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    /// Dot-separated, externally-visible field path, e.g. `spec.name`.
    pub field: String,
    /// The rule tag that failed, e.g. `required`, `k8s-name`.
    pub tag: String,
    /// The offending value, rendered as a string (absent for `required`).
    pub value: Option<String>,
    /// Human-readable explanation.
    pub message: String,
}

/// One declarative rule bound to a field path.
#[derive(Clone, Debug)]
pub struct Rule {
    /// Dot-separated path into the JSON document being validated.
    pub field: String,
    /// The rule kind to evaluate.
    pub kind: RuleKind,
}

/// Built-in rule kinds.
#[derive(Clone, Debug)]
pub enum RuleKind {
    /// Field must be present and non-null.
    Required,
    /// Numeric field must be >= this value.
    Min(f64),
    /// Numeric field must be <= this value.
    Max(f64),
    /// String/array length must equal this value.
    Len(usize),
    /// Value must be one of the given strings.
    OneOf(Vec<String>),
    /// Value must look like an email address.
    Email,
    /// Value must be a well-formed URL (scheme://host form).
    Url,
    /// Value must be a valid IPv4 or IPv6 address.
    Ip,
    /// Value must be a valid MAC address (colon- or dash-separated hex octets).
    Mac,
    /// Value must satisfy Kubernetes object-name rules (RFC 1123 subdomain,
    /// length 1..=253).
    K8sName,
    /// Value must be a valid label key (`[prefix/]name`).
    LabelKey,
    /// Value must be a valid label value (empty, or name rules, length <=63).
    LabelValue,
    /// Value must be a DNS subdomain per RFC 1123.
    DnsSubdomain,
    /// Value must be a DNS label per RFC 1123 (<=63 chars, single segment).
    DnsLabel,
}

fn get_path<'a>(root: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in field.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn is_dns_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let first_ok = bytes[0].is_ascii_lowercase() || bytes[0].is_ascii_digit();
    let last_ok = {
        let last = bytes[bytes.len() - 1];
        last.is_ascii_lowercase() || last.is_ascii_digit()
    };
    first_ok
        && last_ok
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn is_dns_subdomain(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(is_dns_label)
}

fn is_k8s_name(s: &str) -> bool {
    // Kubernetes object names follow the DNS subdomain rule but also permit
    // `.` within a single segment, so the subdomain check already covers it.
    is_dns_subdomain(s)
}

fn is_label_key(s: &str) -> bool {
    match s.split_once('/') {
        Some((prefix, name)) => is_dns_subdomain(prefix) && is_label_name(name),
        None => is_label_name(s),
    }
}

fn is_label_name(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_alphanumeric();
    is_alnum(bytes[0])
        && is_alnum(bytes[bytes.len() - 1])
        && s.bytes()
            .all(|b| is_alnum(b) || b == b'-' || b == b'_' || b == b'.')
}

fn is_label_value(s: &str) -> bool {
    s.is_empty() || is_label_name(s)
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn is_url(s: &str) -> bool {
    s.split_once("://")
        .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty())
}

fn is_ip(s: &str) -> bool {
    s.parse::<std::net::IpAddr>().is_ok()
}

fn is_mac(s: &str) -> bool {
    let segments: Vec<&str> = if s.contains(':') {
        s.split(':').collect()
    } else if s.contains('-') {
        s.split('-').collect()
    } else {
        return false;
    };
    segments.len() == 6
        && segments
            .iter()
            .all(|seg| seg.len() == 2 && seg.bytes().all(|b| b.is_ascii_hexdigit()))
}

impl Rule {
    fn evaluate(&self, root: &Value) -> Option<FieldError> {
        let value = get_path(root, &self.field);
        let present = value.is_some_and(|v| !v.is_null());

        let fail = |tag: &str, message: String| {
            Some(FieldError {
                field: self.field.clone(),
                tag: tag.to_string(),
                value: value.and_then(as_string),
                message,
            })
        };

        match &self.kind {
            RuleKind::Required => {
                if present {
                    None
                } else {
                    fail("required", format!("{} is required", self.field))
                }
            }
            _ if !present => None, // Non-required rules are skipped on absent fields.
            RuleKind::Min(min) => {
                let n = value.and_then(Value::as_f64);
                match n {
                    Some(n) if n >= *min => None,
                    _ => fail("min", format!("{} must be >= {min}", self.field)),
                }
            }
            RuleKind::Max(max) => {
                let n = value.and_then(Value::as_f64);
                match n {
                    Some(n) if n <= *max => None,
                    _ => fail("max", format!("{} must be <= {max}", self.field)),
                }
            }
            RuleKind::Len(len) => {
                let actual = match value.unwrap() {
                    Value::String(s) => Some(s.chars().count()),
                    Value::Array(a) => Some(a.len()),
                    _ => None,
                };
                match actual {
                    Some(n) if n == *len => None,
                    _ => fail("len", format!("{} must have length {len}", self.field)),
                }
            }
            RuleKind::OneOf(options) => {
                let s = value.and_then(Value::as_str);
                match s {
                    Some(s) if options.iter().any(|o| o == s) => None,
                    _ => fail(
                        "oneof",
                        format!("{} must be one of {options:?}", self.field),
                    ),
                }
            }
            RuleKind::Email => match value.and_then(Value::as_str) {
                Some(s) if is_email(s) => None,
                _ => fail("email", format!("{} must be a valid email address", self.field)),
            },
            RuleKind::Url => match value.and_then(Value::as_str) {
                Some(s) if is_url(s) => None,
                _ => fail("url", format!("{} must be a valid URL", self.field)),
            },
            RuleKind::Ip => match value.and_then(Value::as_str) {
                Some(s) if is_ip(s) => None,
                _ => fail("ip", format!("{} must be a valid IP address", self.field)),
            },
            RuleKind::Mac => match value.and_then(Value::as_str) {
                Some(s) if is_mac(s) => None,
                _ => fail("mac", format!("{} must be a valid MAC address", self.field)),
            },
            RuleKind::K8sName => match value.and_then(Value::as_str) {
                Some(s) if is_k8s_name(s) => None,
                _ => fail(
                    "k8s-name",
                    format!("{} must be a valid Kubernetes-style name", self.field),
                ),
            },
            RuleKind::LabelKey => match value.and_then(Value::as_str) {
                Some(s) if is_label_key(s) => None,
                _ => fail("label-key", format!("{} must be a valid label key", self.field)),
            },
            RuleKind::LabelValue => match value.and_then(Value::as_str) {
                Some(s) if is_label_value(s) => None,
                _ => fail(
                    "label-value",
                    format!("{} must be a valid label value", self.field),
                ),
            },
            RuleKind::DnsSubdomain => match value.and_then(Value::as_str) {
                Some(s) if is_dns_subdomain(s) => None,
                _ => fail(
                    "dns-subdomain",
                    format!("{} must be a valid DNS subdomain", self.field),
                ),
            },
            RuleKind::DnsLabel => match value.and_then(Value::as_str) {
                Some(s) if is_dns_label(s) => None,
                _ => fail("dns-label", format!("{} must be a valid DNS label", self.field)),
            },
        }
    }
}

/// Per-kind business validation, run after the declarative rules pass.
#[async_trait::async_trait]
pub trait Validate: Send + Sync {
    /// Validate kind-specific invariants that a flat rule list can't express.
    async fn validate(&self, value: &Value) -> Vec<FieldError>;
}

/// Runs a fixed rule set (optionally followed by a [`Validate`] capability)
/// against a JSON document.
#[derive(Default)]
pub struct Validator {
    rules: Vec<Rule>,
}

impl Validator {
    /// An empty validator with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Attach a rule, builder-style.
    #[must_use]
    pub fn with_rule(mut self, field: impl Into<String>, kind: RuleKind) -> Self {
        self.rules.push(Rule {
            field: field.into(),
            kind,
        });
        self
    }

    /// Run declarative rules against `value`, returning every violation.
    #[must_use]
    pub fn validate_declarative(&self, value: &Value) -> Vec<FieldError> {
        self.rules.iter().filter_map(|r| r.evaluate(value)).collect()
    }

    /// Run declarative rules, then an optional business-rule capability,
    /// returning a [`FabricaError::Validation`] if anything failed.
    ///
    /// # Errors
    /// Returns [`FabricaError::Validation`] when one or more rules fail.
    pub async fn validate(
        &self,
        value: &Value,
        capability: Option<&dyn Validate>,
    ) -> Result<(), FabricaError> {
        let mut errors = self.validate_declarative(value);
        if let Some(capability) = capability {
            errors.extend(capability.validate(value).await);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FabricaError::Validation(ValidationError::Failed(errors)))
        }
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
