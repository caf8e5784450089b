// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use super::*;
use crate::events::EventBusConfig;

fn new_controller() -> (Arc<Controller>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(crate::storage::file::FileStorage::new(dir.path()));
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    (Arc::new(Controller::new(storage, bus, 2)), dir)
}

struct SucceedingReconciler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Reconciler for SucceedingReconciler {
    fn kind(&self) -> &str {
        "Device"
    }

    async fn reconcile(&self, resource: &mut Resource) -> anyhow::Result<ReconcileOutcome> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        resource.status.extra.insert("observed".to_string(), json!(true));
        Ok(ReconcileOutcome::done())
    }
}

struct FailingReconciler;

#[async_trait]
impl Reconciler for FailingReconciler {
    fn kind(&self) -> &str {
        "Device"
    }

    async fn reconcile(&self, _resource: &mut Resource) -> anyhow::Result<ReconcileOutcome> {
        anyhow::bail!("boom")
    }
}

struct FinalizedReconciler {
    cleaned_up: Arc<AtomicUsize>,
}

#[async_trait]
impl Reconciler for FinalizedReconciler {
    fn kind(&self) -> &str {
        "Device"
    }

    async fn reconcile(&self, _resource: &mut Resource) -> anyhow::Result<ReconcileOutcome> {
        Ok(ReconcileOutcome::done())
    }

    fn finalizer(&self) -> Option<&str> {
        Some("device.fabrica.io/finalizer")
    }

    async fn cleanup(&self, _resource: &Resource) -> anyhow::Result<()> {
        self.cleaned_up.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn process_one_runs_reconciler_and_persists_status() {
    let (controller, _dir) = new_controller();
    let calls = Arc::new(AtomicUsize::new(0));
    controller
        .register(Arc::new(SucceedingReconciler { calls: Arc::clone(&calls) }))
        .await;

    let resource = Resource::new("fabrica/v1", "Device", "v1", "dev-1", json!({}));
    let uid = resource.metadata.uid.clone();
    controller
        .storage
        .save("Device", &uid, serde_json::to_value(&resource).unwrap())
        .await
        .unwrap();

    controller.enqueue("Device", uid.clone(), Duration::ZERO).await;
    controller.start("io.fabrica").await;
    settle().await;
    controller.stop(Duration::from_millis(500)).await;

    assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    let stored = controller.storage.load("Device", &uid).await.unwrap();
    assert_eq!(stored["status"]["observed"], json!(true));
    assert_eq!(stored["metadata"]["observedGeneration"], json!(1));
}

#[tokio::test]
async fn failing_reconciler_sets_reconciling_false_with_error_reason_and_requeues() {
    let (controller, _dir) = new_controller();
    controller.register(Arc::new(FailingReconciler)).await;

    let resource = Resource::new("fabrica/v1", "Device", "v1", "dev-1", json!({}));
    let uid = resource.metadata.uid.clone();
    controller
        .storage
        .save("Device", &uid, serde_json::to_value(&resource).unwrap())
        .await
        .unwrap();

    controller.enqueue("Device", uid.clone(), Duration::ZERO).await;
    controller.start("io.fabrica").await;
    settle().await;
    controller.stop(Duration::from_millis(500)).await;

    let stored = controller.storage.load("Device", &uid).await.unwrap();
    let conditions = stored["status"]["conditions"].as_array().unwrap();
    let reconciling = conditions.iter().find(|c| c["type"] == "Reconciling").unwrap();
    assert_eq!(reconciling["status"], "False");
    assert_eq!(reconciling["reason"], "Error");
}

#[tokio::test]
async fn deletion_without_finalizer_removes_resource() {
    let (controller, _dir) = new_controller();
    controller.register(Arc::new(FailingReconciler)).await;

    let mut resource = Resource::new("fabrica/v1", "Device", "v1", "dev-1", json!({}));
    resource.metadata.deletion_timestamp = Some(chrono::Utc::now());
    let uid = resource.metadata.uid.clone();
    controller
        .storage
        .save("Device", &uid, serde_json::to_value(&resource).unwrap())
        .await
        .unwrap();

    controller.enqueue("Device", uid.clone(), Duration::ZERO).await;
    controller.start("io.fabrica").await;
    settle().await;
    controller.stop(Duration::from_millis(500)).await;

    assert!(!controller.storage.exists("Device", &uid).await.unwrap());
}

#[tokio::test]
async fn deletion_with_finalizer_runs_cleanup_before_removal() {
    let (controller, _dir) = new_controller();
    let cleaned_up = Arc::new(AtomicUsize::new(0));
    controller
        .register(Arc::new(FinalizedReconciler { cleaned_up: Arc::clone(&cleaned_up) }))
        .await;

    let mut resource = Resource::new("fabrica/v1", "Device", "v1", "dev-1", json!({}));
    resource.metadata.finalizers.push("device.fabrica.io/finalizer".to_string());
    resource.metadata.deletion_timestamp = Some(chrono::Utc::now());
    let uid = resource.metadata.uid.clone();
    controller
        .storage
        .save("Device", &uid, serde_json::to_value(&resource).unwrap())
        .await
        .unwrap();

    controller.enqueue("Device", uid.clone(), Duration::ZERO).await;
    controller.start("io.fabrica").await;
    settle().await;
    controller.stop(Duration::from_millis(500)).await;

    assert_eq!(cleaned_up.load(AtomicOrdering::SeqCst), 1);
    assert!(!controller.storage.exists("Device", &uid).await.unwrap());
}

#[tokio::test]
async fn lifecycle_event_triggers_reconcile() {
    let (controller, _dir) = new_controller();
    let calls = Arc::new(AtomicUsize::new(0));
    controller
        .register(Arc::new(SucceedingReconciler { calls: Arc::clone(&calls) }))
        .await;

    let resource = Resource::new("fabrica/v1", "Device", "v1", "dev-1", json!({}));
    let uid = resource.metadata.uid.clone();
    controller
        .storage
        .save("Device", &uid, serde_json::to_value(&resource).unwrap())
        .await
        .unwrap();

    controller.event_bus.start().await;
    controller.start("io.fabrica").await;
    controller.event_bus.publish_lifecycle_event(&resource, "created").await;
    settle().await;
    controller.stop(Duration::from_millis(500)).await;
    controller.event_bus.close().await;

    assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
}
