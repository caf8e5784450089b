// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The reconciliation controller: per-kind [`Reconciler`]s driven by a
//! delay-aware priority queue, with per-`(kind, uid)` mutual exclusion and
//! exponential backoff on error.
//!
//! Generalizes the teacher's "Watch -> Reconcile -> Update -> Status" loop
//! (`reconcilers/mod.rs`) away from `kube`'s watch streams and toward the
//! Fabrica [`crate::events::EventBus`]: lifecycle events published on
//! resource create/update feed the queue instead of a Kubernetes watch.

pub mod finalizers;
pub mod retry;

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::errors::FabricaError;
use crate::events::{CloudEvent, EventBus, EventHandler};
use crate::resource::Resource;
use crate::storage::Storage;
use finalizers::FinalizerCleanup;
use retry::{default_backoff, ExponentialBackoff};

/// What a [`Reconciler`] wants to happen after it returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    /// No further reconciliation is scheduled (until the next spec/event
    /// change).
    #[must_use]
    pub fn done() -> Self {
        Self { requeue_after: None }
    }

    /// Reconcile again after `delay`. Passing [`Duration::ZERO`] unifies the
    /// teacher's separate `Requeue: true` and `RequeueAfter(0)` signals.
    #[must_use]
    pub fn requeue_after(delay: Duration) -> Self {
        Self { requeue_after: Some(delay) }
    }
}

/// Per-kind reconciliation logic.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// The kind this reconciler handles, e.g. `"Device"`.
    fn kind(&self) -> &str;

    /// Reconcile one resource, mutating its `status` in place.
    ///
    /// # Errors
    /// Any error triggers an exponential-backoff requeue and sets
    /// `Reconciling=False` with `reason="Error"` and the error message.
    async fn reconcile(&self, resource: &mut Resource) -> anyhow::Result<ReconcileOutcome>;

    /// The finalizer this kind registers, if it needs cleanup before
    /// deletion. `None` means resources of this kind delete immediately.
    fn finalizer(&self) -> Option<&str> {
        None
    }

    /// Cleanup run before the finalizer is removed. Only called when
    /// [`Reconciler::finalizer`] returns `Some`.
    async fn cleanup(&self, _resource: &Resource) -> anyhow::Result<()> {
        Ok(())
    }
}

struct ReconcilerCleanupAdapter<'a>(&'a dyn Reconciler);

#[async_trait]
impl FinalizerCleanup for ReconcilerCleanupAdapter<'_> {
    async fn cleanup(&self, resource: &Resource) -> anyhow::Result<()> {
        self.0.cleanup(resource).await
    }
}

struct QueueItem {
    ready_at: Instant,
    kind: String,
    uid: String,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at
    }
}
impl Eq for QueueItem {}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest deadline first.
        other.ready_at.cmp(&self.ready_at)
    }
}

/// The reconciliation controller.
pub struct Controller {
    storage: Arc<dyn Storage>,
    event_bus: Arc<EventBus>,
    reconcilers: RwLock<HashMap<String, Arc<dyn Reconciler>>>,
    queue: Mutex<BinaryHeap<QueueItem>>,
    notify: Notify,
    in_flight: Mutex<HashSet<(String, String)>>,
    backoffs: Mutex<HashMap<(String, String), ExponentialBackoff>>,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    subscription_id: Mutex<Option<u64>>,
    closed: AtomicBool,
}

impl Controller {
    /// Build a controller backed by `storage` and wired to `event_bus`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, event_bus: Arc<EventBus>, worker_count: usize) -> Self {
        Self {
            storage,
            event_bus,
            reconcilers: RwLock::new(HashMap::new()),
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            in_flight: Mutex::new(HashSet::new()),
            backoffs: Mutex::new(HashMap::new()),
            worker_count: worker_count.max(1),
            workers: Mutex::new(Vec::new()),
            subscription_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Register the reconciler for one kind. Replaces any prior registration
    /// for the same kind.
    pub async fn register(&self, reconciler: Arc<dyn Reconciler>) {
        let kind = reconciler.kind().to_string();
        self.reconcilers.write().await.insert(kind, reconciler);
    }

    /// Schedule `(kind, uid)` to be reconciled after `delay`.
    pub async fn enqueue(&self, kind: impl Into<String>, uid: impl Into<String>, delay: Duration) {
        self.queue.lock().await.push(QueueItem {
            ready_at: Instant::now() + delay,
            kind: kind.into(),
            uid: uid.into(),
        });
        self.notify.notify_one();
    }

    /// Subscribe to lifecycle events and start the worker pool. Idempotent.
    pub async fn start(self: &Arc<Self>, event_type_prefix: &str) {
        {
            let mut sub = self.subscription_id.lock().await;
            if sub.is_none() {
                let handler = LifecycleHandler { controller: Arc::downgrade(self) };
                let id = self
                    .event_bus
                    .subscribe(format!("{event_type_prefix}.**"), Arc::new(handler))
                    .await;
                *sub = Some(id);
            }
        }
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        for _ in 0..self.worker_count {
            let controller = Arc::clone(self);
            workers.push(tokio::spawn(run_worker(controller)));
        }
    }

    /// Stop accepting new work, waiting up to `deadline` for in-flight
    /// reconciles to drain before joining the worker pool.
    pub async fn stop(&self, deadline: Duration) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();

        if let Some(id) = self.subscription_id.lock().await.take() {
            self.event_bus.unsubscribe(id).await;
        }

        let deadline_at = Instant::now() + deadline;
        while Instant::now() < deadline_at {
            if self.in_flight.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            handle.abort();
        }
    }

    async fn take_ready(&self) -> Option<(String, String)> {
        let mut queue = self.queue.lock().await;
        let now = Instant::now();
        let mut deferred = Vec::new();
        let result = loop {
            match queue.peek() {
                Some(item) if item.ready_at <= now => {
                    let item = queue.pop().unwrap();
                    let key = (item.kind.clone(), item.uid.clone());
                    let mut in_flight = self.in_flight.lock().await;
                    if in_flight.contains(&key) {
                        deferred.push(item);
                        continue;
                    }
                    in_flight.insert(key.clone());
                    break Some(key);
                }
                _ => break None,
            }
        };
        for item in deferred {
            queue.push(item);
        }
        result
    }

    async fn next_deadline(&self) -> Option<Instant> {
        self.queue.lock().await.peek().map(|item| item.ready_at)
    }

    async fn process(&self, kind: &str, uid: &str) {
        let reconciler = self.reconcilers.read().await.get(kind).cloned();
        let Some(reconciler) = reconciler else {
            tracing::warn!(kind, uid, "no reconciler registered for kind");
            return;
        };

        if let Err(err) = self.process_one(kind, uid, reconciler.as_ref()).await {
            tracing::warn!(kind, uid, error = %err, "reconcile step failed");
        }

        self.in_flight
            .lock()
            .await
            .remove(&(kind.to_string(), uid.to_string()));
    }

    async fn process_one(&self, kind: &str, uid: &str, reconciler: &dyn Reconciler) -> Result<(), FabricaError> {
        let value = match self.storage.load(kind, uid).await {
            Ok(value) => value,
            Err(FabricaError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };
        let mut resource: Resource =
            serde_json::from_value(value).map_err(|err| FabricaError::InvalidData(err.to_string()))?;

        if resource.metadata.is_terminating() {
            self.process_deletion(&mut resource, reconciler).await?;
            return Ok(());
        }

        if resource.needs_reconcile() {
            resource
                .set_condition_with_events("Reconciling", crate::resource::ConditionStatus::True, None, None, &self.event_bus)
                .await;
        }

        match reconciler.reconcile(&mut resource).await {
            Ok(outcome) => {
                resource.metadata.observed_generation = Some(resource.metadata.generation);
                resource
                    .set_condition_with_events(
                        "Reconciling",
                        crate::resource::ConditionStatus::False,
                        Some("Reconciled".to_string()),
                        None,
                        &self.event_bus,
                    )
                    .await;
                self.persist(&resource).await?;
                self.reset_backoff(kind, uid).await;
                if let Some(delay) = outcome.requeue_after {
                    self.enqueue(kind.to_string(), uid.to_string(), delay).await;
                }
            }
            Err(err) => {
                resource
                    .set_condition_with_events(
                        "Reconciling",
                        crate::resource::ConditionStatus::False,
                        Some("Error".to_string()),
                        Some(err.to_string()),
                        &self.event_bus,
                    )
                    .await;
                self.persist(&resource).await?;
                let delay = self.next_backoff(kind, uid).await;
                self.enqueue(kind.to_string(), uid.to_string(), delay).await;
            }
        }
        Ok(())
    }

    async fn process_deletion(&self, resource: &mut Resource, reconciler: &dyn Reconciler) -> Result<(), FabricaError> {
        let kind = resource.kind.clone();
        let uid = resource.metadata.uid.clone();
        let done = match reconciler.finalizer() {
            Some(finalizer) => {
                let adapter = ReconcilerCleanupAdapter(reconciler);
                finalizers::handle_deletion(self.storage.as_ref(), resource, finalizer, &adapter).await?
            }
            None => true,
        };
        if done {
            self.storage.delete(&kind, &uid).await?;
            self.event_bus.publish_lifecycle_event(resource, "deleted").await;
            self.backoffs.lock().await.remove(&(kind, uid));
        }
        Ok(())
    }

    async fn persist(&self, resource: &Resource) -> Result<(), FabricaError> {
        let value = serde_json::to_value(resource).map_err(|err| FabricaError::InvalidData(err.to_string()))?;
        self.storage.save(&resource.kind, &resource.metadata.uid, value).await
    }

    async fn reset_backoff(&self, kind: &str, uid: &str) {
        if let Some(backoff) = self.backoffs.lock().await.get_mut(&(kind.to_string(), uid.to_string())) {
            backoff.reset();
        }
    }

    async fn next_backoff(&self, kind: &str, uid: &str) -> Duration {
        self.backoffs
            .lock()
            .await
            .entry((kind.to_string(), uid.to_string()))
            .or_insert_with(default_backoff)
            .next_backoff()
    }
}

struct LifecycleHandler {
    controller: Weak<Controller>,
}

#[async_trait]
impl EventHandler for LifecycleHandler {
    async fn handle(&self, event: &CloudEvent) -> anyhow::Result<()> {
        let Some(controller) = self.controller.upgrade() else {
            return Ok(());
        };
        let Some(subject) = event.subject.as_deref() else {
            return Ok(());
        };
        let Some((_, uid)) = subject.split_once('/') else {
            return Ok(());
        };
        let reconcilers = controller.reconcilers.read().await;
        let Some(kind) = reconcilers
            .keys()
            .find(|k| event.r#type.contains(&k.to_lowercase()))
            .cloned()
        else {
            return Ok(());
        };
        drop(reconcilers);
        controller.enqueue(kind, uid.to_string(), Duration::ZERO).await;
        Ok(())
    }
}

async fn run_worker(controller: Arc<Controller>) {
    loop {
        if controller.closed.load(Ordering::Acquire) {
            break;
        }
        match controller.take_ready().await {
            Some((kind, uid)) => controller.process(&kind, &uid).await,
            None => {
                let wait = match controller.next_deadline().await {
                    Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                    None => Duration::from_secs(1),
                };
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = controller.notify.notified() => {}
                }
            }
        }
    }
}

/// Convenience re-export so callers only need `crate::reconcile::FnHandler`
/// when wiring a lifecycle subscriber by hand.
pub use crate::events::FnHandler as EventFnHandler;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
