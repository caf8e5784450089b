// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn detect_patch_type_ignores_parameters_and_case() {
    assert_eq!(
        detect_patch_type("Application/JSON-Patch+JSON; charset=utf-8"),
        PatchType::JsonPatch
    );
    assert_eq!(
        detect_patch_type("application/shorthand-patch+json"),
        PatchType::Shorthand
    );
    assert_eq!(detect_patch_type("application/merge-patch+json"), PatchType::Merge);
    assert_eq!(detect_patch_type("text/plain"), PatchType::Merge);
}

#[test]
fn merge_patch_removes_null_fields() {
    let original = json!({"a": 1, "b": 2});
    let patch_doc = json!({"b": null, "c": 3});
    let updated = apply_patch(&original, &patch_doc, PatchType::Merge).unwrap();
    assert_eq!(updated, json!({"a": 1, "c": 3}));
}

#[test]
fn merge_patch_empty_object_is_identity() {
    let original = json!({"a": 1});
    let updated = apply_patch(&original, &json!({}), PatchType::Merge).unwrap();
    assert_eq!(updated, original);
}

#[test]
fn json_patch_applies_standard_ops() {
    let original = json!({"a": 1});
    let patch_doc = json!([{"op": "add", "path": "/b", "value": 2}]);
    let updated = apply_patch(&original, &patch_doc, PatchType::JsonPatch).unwrap();
    assert_eq!(updated, json!({"a": 1, "b": 2}));
}

#[test]
fn json_patch_test_failure_is_apply_failure() {
    let original = json!({"a": 1});
    let patch_doc = json!([{"op": "test", "path": "/a", "value": 2}]);
    let err = apply_patch(&original, &patch_doc, PatchType::JsonPatch).unwrap_err();
    assert_eq!(err.status_code(), 422);
}

#[test]
fn json_patch_remove_missing_path_is_apply_failure() {
    let original = json!({"a": 1});
    let patch_doc = json!([{"op": "remove", "path": "/missing"}]);
    let err = apply_patch(&original, &patch_doc, PatchType::JsonPatch).unwrap_err();
    assert_eq!(err.status_code(), 422);
}

#[test]
fn shorthand_patch_sets_nested_path_and_removes_with_null() {
    let original = json!({"spec": {"name": "old", "keep": true}});
    let patch_doc = json!({"spec.name": "new", "spec.keep": null});
    let updated = apply_patch(&original, &patch_doc, PatchType::Shorthand).unwrap();
    assert_eq!(updated, json!({"spec": {"name": "new"}}));
}

#[test]
fn shorthand_patch_creates_intermediate_objects() {
    let original = json!({});
    let patch_doc = json!({"spec.nested.value": 5});
    let updated = apply_patch(&original, &patch_doc, PatchType::Shorthand).unwrap();
    assert_eq!(updated, json!({"spec": {"nested": {"value": 5}}}));
}

#[test]
fn compute_patch_changes_lists_changed_leaf_paths() {
    let before = json!({"a": 1, "b": {"c": 2, "d": 3}});
    let after = json!({"a": 1, "b": {"c": 20, "d": 3}, "e": 5});
    let changes = compute_patch_changes(&before, &after);
    assert_eq!(changes, vec!["/b/c".to_string(), "/e".to_string()]);
}

#[test]
fn field_mask_rejects_out_of_mask_changes() {
    let original = json!({"spec": {"a": 1}, "status": {"b": 2}});
    let patch_doc = json!({"status": {"b": 3}});
    let options = ApplyOptions {
        field_mask: Some(vec!["spec".to_string()]),
        ..ApplyOptions::permissive()
    };
    let err = apply_patch_with_options(&original, &patch_doc, PatchType::Merge, &options).unwrap_err();
    assert_eq!(err.status_code(), 422);
}

#[test]
fn field_mask_allows_in_mask_changes() {
    let original = json!({"spec": {"a": 1}, "status": {"b": 2}});
    let patch_doc = json!({"spec": {"a": 5}});
    let options = ApplyOptions {
        field_mask: Some(vec!["spec".to_string()]),
        ..ApplyOptions::permissive()
    };
    let updated = apply_patch_with_options(&original, &patch_doc, PatchType::Merge, &options).unwrap();
    assert_eq!(updated, json!({"spec": {"a": 5}, "status": {"b": 2}}));
}

#[test]
fn dry_run_returns_original_document() {
    let original = json!({"a": 1});
    let patch_doc = json!({"a": 2});
    let options = ApplyOptions {
        dry_run: true,
        ..ApplyOptions::permissive()
    };
    let result = apply_patch_with_options(&original, &patch_doc, PatchType::Merge, &options).unwrap();
    assert_eq!(result, original);
}

#[test]
fn disallowing_add_fields_rejects_new_keys() {
    let original = json!({"a": 1});
    let patch_doc = json!({"b": 2});
    let options = ApplyOptions {
        allow_add_fields: false,
        allow_remove_fields: true,
        field_mask: None,
        dry_run: false,
    };
    let err = apply_patch_with_options(&original, &patch_doc, PatchType::Merge, &options).unwrap_err();
    assert_eq!(err.status_code(), 422);
}

#[test]
fn disallowing_remove_fields_rejects_deletions() {
    let original = json!({"a": 1, "b": 2});
    let patch_doc = json!({"b": null});
    let options = ApplyOptions {
        allow_add_fields: true,
        allow_remove_fields: false,
        field_mask: None,
        dry_run: false,
    };
    let err = apply_patch_with_options(&original, &patch_doc, PatchType::Merge, &options).unwrap_err();
    assert_eq!(err.status_code(), 422);
}
