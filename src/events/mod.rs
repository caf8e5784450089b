// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-process event bus with glob-pattern subscriptions, a bounded ring
//! buffer with overflow-drop semantics, and concurrent worker-pool
//! delivery — plus the lifecycle/condition CloudEvents bridge that the
//! storage and resource layers publish through.
//!
//! The controller pattern this replaces ("Watch -> Reconcile", as described
//! in the teacher's `reconcilers/mod.rs` module doc) is event-driven in the
//! same sense: lifecycle events published here are what the reconciliation
//! controller (`src/reconcile`) subscribes to.

pub mod cloudevents;
pub mod glob;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

pub use cloudevents::CloudEvent;

use crate::constants::{
    DEFAULT_CONDITION_EVENT_PREFIX, DEFAULT_EVENT_BUFFER_SIZE, DEFAULT_EVENT_SOURCE,
    DEFAULT_EVENT_TYPE_PREFIX, DEFAULT_EVENT_WORKERS,
};
use crate::resource::{ConditionStatus, Resource};
use crate::storage::file::plural_lower;

/// A subscriber's callback. Implemented by hand for production handlers, or
/// via [`FnHandler`] for closures.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivered event. Errors are logged; they never propagate
    /// to other subscribers or to the publisher.
    async fn handle(&self, event: &CloudEvent) -> anyhow::Result<()>;
}

/// Adapts an async closure into an [`EventHandler`], for subscribers that
/// don't need their own type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(CloudEvent) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &CloudEvent) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

/// Configuration for an [`EventBus`].
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    /// Master switch; when `false`, `publish` is a no-op.
    pub enabled: bool,
    /// Whether lifecycle (`created`/`updated`/`patched`/`deleted`) events
    /// are published.
    pub lifecycle_events_enabled: bool,
    /// Whether condition-transition events are published.
    pub condition_events_enabled: bool,
    /// Prefix for lifecycle event types.
    pub event_type_prefix: String,
    /// Prefix for condition event types.
    pub condition_event_prefix: String,
    /// CloudEvents `source` attribute.
    pub source: String,
    /// Ring buffer capacity.
    pub buffer_size: usize,
    /// Number of concurrent delivery workers.
    pub workers: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lifecycle_events_enabled: true,
            condition_events_enabled: true,
            event_type_prefix: DEFAULT_EVENT_TYPE_PREFIX.to_string(),
            condition_event_prefix: DEFAULT_CONDITION_EVENT_PREFIX.to_string(),
            source: DEFAULT_EVENT_SOURCE.to_string(),
            buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            workers: DEFAULT_EVENT_WORKERS,
        }
    }
}

struct Subscription {
    id: u64,
    filter: String,
    handler: Arc<dyn EventHandler>,
}

struct Ring {
    queue: VecDeque<CloudEvent>,
    capacity: usize,
}

/// The in-process event bus: bounded ring, glob subscriptions, worker-pool
/// delivery.
pub struct EventBus {
    config: EventBusConfig,
    subscriptions: RwLock<Vec<Subscription>>,
    ring: Mutex<Ring>,
    notify: Notify,
    next_sub_id: AtomicU64,
    overflow_total: AtomicU64,
    closed: AtomicBool,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    /// Build a new bus. Call [`EventBus::start`] (wrapped in an `Arc`)
    /// before publishing for delivery to actually happen; `publish` still
    /// succeeds (events just queue) if called beforehand.
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        let capacity = config.buffer_size;
        Self {
            config,
            subscriptions: RwLock::new(Vec::new()),
            ring: Mutex::new(Ring {
                queue: VecDeque::new(),
                capacity,
            }),
            notify: Notify::new(),
            next_sub_id: AtomicU64::new(1),
            overflow_total: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe `handler` to events whose type matches `filter` (a glob
    /// pattern per [`glob::matches`]). Returns a subscription id.
    pub async fn subscribe(&self, filter: impl Into<String>, handler: Arc<dyn EventHandler>) -> u64 {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.write().await.push(Subscription {
            id,
            filter: filter.into(),
            handler,
        });
        id
    }

    /// Remove a subscription by id.
    pub async fn unsubscribe(&self, id: u64) {
        self.subscriptions.write().await.retain(|s| s.id != id);
    }

    /// Enqueue `event` for delivery. Non-blocking: when the ring is full the
    /// oldest queued event is dropped and a counter is incremented.
    pub async fn publish(&self, event: CloudEvent) {
        if !self.config.enabled || self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut ring = self.ring.lock().await;
            if ring.queue.len() >= ring.capacity {
                ring.queue.pop_front();
                self.overflow_total.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_event_overflow();
            }
            ring.queue.push_back(event.clone());
        }
        crate::metrics::record_event_published(&event.r#type);
        self.notify.notify_one();
    }

    /// Publish a lifecycle event for `resource` (no-op if lifecycle events
    /// are disabled).
    pub async fn publish_lifecycle_event(&self, resource: &Resource, verb: &str) {
        if !self.config.lifecycle_events_enabled {
            return;
        }
        let subject = format!("{}/{}", plural_lower(&resource.kind), resource.metadata.uid);
        let event = CloudEvent::lifecycle(
            &self.config.event_type_prefix,
            &self.config.source,
            &resource.kind,
            verb,
            subject,
            serde_json::to_value(resource).unwrap_or(serde_json::Value::Null),
        );
        self.publish(event).await;
    }

    /// Publish a condition-transition event (no-op if condition events are
    /// disabled). Called by [`Resource::set_condition_with_events`].
    pub async fn publish_condition_event(
        &self,
        resource: &Resource,
        condition_type: &str,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        if !self.config.condition_events_enabled {
            return;
        }
        let subject = format!("{}/{}", plural_lower(&resource.kind), resource.metadata.uid);
        let data = serde_json::json!({
            "type": condition_type,
            "status": format!("{status:?}"),
            "reason": reason,
            "message": message,
        });
        let event = CloudEvent::condition(&self.config.condition_event_prefix, &self.config.source, condition_type, subject, data);
        self.publish(event).await;
    }

    /// Number of events dropped due to ring overflow so far.
    #[must_use]
    pub fn overflow_total(&self) -> u64 {
        self.overflow_total.load(Ordering::Relaxed)
    }

    /// Start the worker pool. Idempotent.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut workers = self.workers.lock().await;
        for _ in 0..self.config.workers.max(1) {
            let bus = Arc::clone(self);
            workers.push(tokio::spawn(run_worker(bus)));
        }
    }

    /// Stop accepting new deliveries, drain whatever is queued, then join
    /// the worker pool.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
    }
}

async fn run_worker(bus: Arc<EventBus>) {
    loop {
        loop {
            let event = {
                let mut ring = bus.ring.lock().await;
                ring.queue.pop_front()
            };
            let Some(event) = event else { break };
            dispatch(&bus, event).await;
        }
        if bus.closed.load(Ordering::Acquire) {
            break;
        }
        bus.notify.notified().await;
    }
}

async fn dispatch(bus: &EventBus, event: CloudEvent) {
    let matched: Vec<Arc<dyn EventHandler>> = {
        let subs = bus.subscriptions.read().await;
        subs.iter()
            .filter(|s| glob::matches(&s.filter, &event.r#type))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    };

    let deliveries = matched.into_iter().map(|handler| {
        let event = event.clone();
        async move {
            if let Err(err) = handler.handle(&event).await {
                tracing::warn!(event_type = %event.r#type, error = %err, "event handler failed");
                crate::metrics::record_event_handler_failure(&event.r#type);
            }
        }
    });
    futures::future::join_all(deliveries).await;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
