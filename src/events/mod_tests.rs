// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::*;

struct CountingHandler {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, _event: &CloudEvent) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn subscriber_receives_matching_events_only() {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    bus.start().await;

    let matched = Arc::new(AtomicUsize::new(0));
    let unmatched = Arc::new(AtomicUsize::new(0));
    bus.subscribe(
        "io.fabrica.device.*",
        Arc::new(CountingHandler { count: Arc::clone(&matched) }),
    )
    .await;
    bus.subscribe(
        "io.fabrica.widget.*",
        Arc::new(CountingHandler { count: Arc::clone(&unmatched) }),
    )
    .await;

    bus.publish(CloudEvent::lifecycle("io.fabrica", "test", "Device", "created", "devices/d1".into(), json!({})))
        .await;
    settle().await;

    assert_eq!(matched.load(Ordering::SeqCst), 1);
    assert_eq!(unmatched.load(Ordering::SeqCst), 0);
    bus.close().await;
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    bus.start().await;

    let count = Arc::new(AtomicUsize::new(0));
    let id = bus
        .subscribe("io.fabrica.**", Arc::new(CountingHandler { count: Arc::clone(&count) }))
        .await;
    bus.unsubscribe(id).await;

    bus.publish(CloudEvent::lifecycle("io.fabrica", "test", "Device", "created", "devices/d1".into(), json!({})))
        .await;
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
    bus.close().await;
}

#[tokio::test]
async fn overflow_drops_oldest_and_counts() {
    let mut config = EventBusConfig::default();
    config.buffer_size = 2;
    let bus = EventBus::new(config);

    for i in 0..5 {
        bus.publish(CloudEvent::lifecycle(
            "io.fabrica",
            "test",
            "Device",
            "created",
            format!("devices/d{i}"),
            json!({}),
        ))
        .await;
    }

    assert_eq!(bus.overflow_total(), 3);
}

#[tokio::test]
async fn start_is_idempotent() {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    bus.start().await;
    bus.start().await;
    assert_eq!(bus.workers.lock().await.len(), EventBusConfig::default().workers);
    bus.close().await;
}

#[tokio::test]
async fn close_rejects_further_publishes() {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    bus.start().await;
    bus.close().await;

    let count_before = bus.overflow_total();
    bus.publish(CloudEvent::lifecycle("io.fabrica", "test", "Device", "created", "devices/d1".into(), json!({})))
        .await;
    assert_eq!(bus.overflow_total(), count_before);
}

#[tokio::test]
async fn disabled_lifecycle_events_are_not_published() {
    let mut config = EventBusConfig::default();
    config.lifecycle_events_enabled = false;
    let bus = Arc::new(EventBus::new(config));
    bus.start().await;

    let count = Arc::new(AtomicUsize::new(0));
    bus.subscribe("io.fabrica.**", Arc::new(CountingHandler { count: Arc::clone(&count) }))
        .await;

    let resource = Resource::new("fabrica/v1", "Device", "v1", "d1", json!({}));
    bus.publish_lifecycle_event(&resource, "created").await;
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
    bus.close().await;
}

#[tokio::test]
async fn condition_event_bridge_matches_condition_prefix() {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    bus.start().await;

    let count = Arc::new(AtomicUsize::new(0));
    bus.subscribe(
        "io.fabrica.condition.**",
        Arc::new(CountingHandler { count: Arc::clone(&count) }),
    )
    .await;

    let resource = Resource::new("fabrica/v1", "Device", "v1", "d1", json!({}));
    bus.publish_condition_event(&resource, "Ready", ConditionStatus::True, None, None)
        .await;
    settle().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    bus.close().await;
}
