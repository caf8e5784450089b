// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PATCH engine supporting three dialects: RFC 7386 merge-patch+json, RFC
//! 6902 json-patch+json (via the `json-patch` crate, sourced from
//! `examples/quay-clair-operator`), and a local shorthand-patch+json
//! dialect.

use serde_json::Value;

use crate::errors::FabricaError;

/// Which PATCH dialect a request used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchType {
    /// RFC 7386 `application/merge-patch+json`.
    Merge,
    /// RFC 6902 `application/json-patch+json`.
    JsonPatch,
    /// Local dot-path dialect, `application/shorthand-patch+json`.
    Shorthand,
}

/// Detect the PATCH dialect from a `Content-Type` header value, ignoring any
/// parameters and case. Defaults to [`PatchType::Merge`] when unrecognized.
#[must_use]
pub fn detect_patch_type(content_type: &str) -> PatchType {
    let base = content_type.split(';').next().unwrap_or("").trim().to_lowercase();
    match base.as_str() {
        "application/json-patch+json" => PatchType::JsonPatch,
        "application/shorthand-patch+json" => PatchType::Shorthand,
        _ => PatchType::Merge,
    }
}

/// Options controlling how a patch is applied.
#[derive(Clone, Debug, Default)]
pub struct ApplyOptions {
    /// Only changes under one of these dot-path prefixes are permitted.
    /// `None` means no restriction.
    pub field_mask: Option<Vec<String>>,
    /// Compute the result without persisting; `apply_patch_with_options`
    /// still returns the mutated document so the caller can inspect it, but
    /// callers that honor dry-run should not call `Storage::save`.
    pub dry_run: bool,
    /// Whether the patch may introduce fields that didn't previously exist.
    pub allow_add_fields: bool,
    /// Whether the patch may remove fields that previously existed.
    pub allow_remove_fields: bool,
}

impl ApplyOptions {
    /// No restrictions: add/remove allowed, no mask, not a dry run.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            field_mask: None,
            dry_run: false,
            allow_add_fields: true,
            allow_remove_fields: true,
        }
    }
}

fn apply_merge_patch(original: &Value, patch_doc: &Value) -> Value {
    let mut doc = original.clone();
    json_patch::merge(&mut doc, patch_doc);
    doc
}

fn apply_json_patch(original: &Value, patch_doc: &Value) -> Result<Value, FabricaError> {
    let patch: json_patch::Patch = serde_json::from_value(patch_doc.clone())
        .map_err(|e| FabricaError::InvalidPatch(e.to_string()))?;
    let mut doc = original.clone();
    json_patch::patch(&mut doc, &patch).map_err(|e| FabricaError::ApplyFailure(e.to_string()))?;
    Ok(doc)
}

fn apply_shorthand_patch(original: &Value, patch_doc: &Value) -> Result<Value, FabricaError> {
    let entries = patch_doc
        .as_object()
        .ok_or_else(|| FabricaError::InvalidPatch("shorthand patch must be a JSON object".into()))?;
    let mut doc = original.clone();
    for (path, value) in entries {
        set_or_remove_dotted(&mut doc, path, value.clone())?;
    }
    Ok(doc)
}

fn set_or_remove_dotted(doc: &mut Value, dotted_path: &str, value: Value) -> Result<(), FabricaError> {
    let segments: Vec<&str> = dotted_path.split('.').collect();
    if segments.is_empty() {
        return Err(FabricaError::InvalidPatch("empty shorthand path".into()));
    }
    let (last, parents) = segments.split_last().expect("non-empty checked above");

    let mut current = doc;
    for segment in parents {
        if !current.is_object() {
            return Err(FabricaError::ApplyFailure(format!(
                "path '{dotted_path}' traverses a non-object at '{segment}'"
            )));
        }
        current = current
            .as_object_mut()
            .expect("checked is_object above")
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }

    let Some(obj) = current.as_object_mut() else {
        return Err(FabricaError::ApplyFailure(format!(
            "path '{dotted_path}' does not resolve to an object"
        )));
    };

    if value.is_null() {
        obj.remove(*last);
    } else {
        obj.insert((*last).to_string(), value);
    }
    Ok(())
}

/// Apply `patch_doc` (in dialect `patch_type`) to `original`, with no
/// restrictions.
///
/// # Errors
/// Returns [`FabricaError::InvalidPatch`] for a malformed patch document, or
/// [`FabricaError::ApplyFailure`] if the patch cannot be applied (e.g. a
/// JSON Patch `test` failed, or `remove`/`replace` targeted a missing path).
pub fn apply_patch(original: &Value, patch_doc: &Value, patch_type: PatchType) -> Result<Value, FabricaError> {
    apply_patch_with_options(original, patch_doc, patch_type, &ApplyOptions::permissive())
}

/// Apply `patch_doc` honoring field masks, dry-run, and add/remove
/// restrictions.
///
/// # Errors
/// As [`apply_patch`], plus [`FabricaError::FieldMaskViolation`] when a
/// changed path falls outside every mask prefix.
pub fn apply_patch_with_options(
    original: &Value,
    patch_doc: &Value,
    patch_type: PatchType,
    options: &ApplyOptions,
) -> Result<Value, FabricaError> {
    let updated = match patch_type {
        PatchType::Merge => apply_merge_patch(original, patch_doc),
        PatchType::JsonPatch => apply_json_patch(original, patch_doc)?,
        PatchType::Shorthand => apply_shorthand_patch(original, patch_doc)?,
    };

    let changes = compute_patch_changes(original, &updated);

    if !options.allow_add_fields || !options.allow_remove_fields {
        for path in &changes {
            let existed_before = get_pointer(original, path).is_some();
            let exists_after = get_pointer(&updated, path).is_some();
            if !existed_before && exists_after && !options.allow_add_fields {
                return Err(FabricaError::ApplyFailure(format!(
                    "patch would add new field '{path}'"
                )));
            }
            if existed_before && !exists_after && !options.allow_remove_fields {
                return Err(FabricaError::ApplyFailure(format!(
                    "patch would remove field '{path}'"
                )));
            }
        }
    }

    if let Some(mask) = &options.field_mask {
        for path in &changes {
            let allowed = mask.iter().any(|prefix| {
                let prefix_pointer = format!("/{}", prefix.replace('.', "/"));
                path == &prefix_pointer || path.starts_with(&format!("{prefix_pointer}/"))
            });
            if !allowed {
                return Err(FabricaError::FieldMaskViolation { path: path.clone() });
            }
        }
    }

    if options.dry_run {
        Ok(original.clone())
    } else {
        Ok(updated)
    }
}

fn get_pointer<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value.pointer(pointer)
}

/// Compute the stable, sorted list of JSON Pointer paths whose leaf value
/// differs between `before` and `after`.
#[must_use]
pub fn compute_patch_changes(before: &Value, after: &Value) -> Vec<String> {
    let mut changes = Vec::new();
    diff_into("".to_string(), before, after, &mut changes);
    changes.sort();
    changes
}

fn diff_into(path: String, before: &Value, after: &Value, out: &mut Vec<String>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut keys: std::collections::BTreeSet<&String> = b.keys().collect();
            keys.extend(a.keys());
            for key in keys {
                let child_path = format!("{path}/{key}");
                match (b.get(key), a.get(key)) {
                    (Some(bv), Some(av)) => diff_into(child_path, bv, av, out),
                    (None, Some(_)) | (Some(_), None) => out.push(child_path),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(b), Value::Array(a)) => {
            if b != a {
                out.push(if path.is_empty() { "/".to_string() } else { path });
            }
        }
        _ => {
            if before != after {
                out.push(if path.is_empty() { "/".to_string() } else { path });
            }
        }
    }
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod patch_tests;
