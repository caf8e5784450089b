// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Fabrica toolkit.
//!
//! Constants are organized by category for easy maintenance, mirroring the
//! teacher's constant-catalogue style.

// ============================================================================
// CloudEvents / Event Bus Constants
// ============================================================================

/// Default `type` prefix for lifecycle events (`<prefix>.<kind>.<verb>`).
pub const DEFAULT_EVENT_TYPE_PREFIX: &str = "io.fabrica";

/// Default `type` prefix for condition-transition events.
pub const DEFAULT_CONDITION_EVENT_PREFIX: &str = "io.fabrica.condition";

/// Default CloudEvents `source` attribute when none is configured.
pub const DEFAULT_EVENT_SOURCE: &str = "io.fabrica/reconciler";

/// CloudEvents `specversion` emitted by this crate.
pub const CLOUDEVENTS_SPEC_VERSION: &str = "1.0";

/// Default bounded ring-buffer capacity for the in-process event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1024;

/// Default number of concurrent delivery workers for the event bus.
pub const DEFAULT_EVENT_WORKERS: usize = 5;

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Initial backoff interval for reconcile retries (1 second).
pub const RECONCILE_INITIAL_INTERVAL_MILLIS: u64 = 1000;

/// Maximum backoff interval for reconcile retries (5 minutes).
pub const RECONCILE_MAX_INTERVAL_SECS: u64 = 300;

/// Backoff multiplier (exponential growth factor).
pub const RECONCILE_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor applied to each backoff interval (±10%).
pub const RECONCILE_RANDOMIZATION_FACTOR: f64 = 0.1;

/// Default number of concurrent reconcile workers.
pub const DEFAULT_RECONCILE_WORKERS: usize = 5;

// ============================================================================
// Versioning Constants
// ============================================================================

/// Default schema version assigned to a kind when none is specified at
/// registration time.
pub const DEFAULT_SCHEMA_VERSION: &str = "v1";

// ============================================================================
// Storage Constants
// ============================================================================

/// Subdirectory (under a kind's directory) holding immutable spec snapshots.
pub const SNAPSHOTS_DIR_NAME: &str = "versions";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime.
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Server Constants
// ============================================================================

/// Path for the Prometheus metrics endpoint, mounted on the main API router.
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Default bind address for the main API server.
pub const DEFAULT_SERVER_BIND_ADDRESS: &str = "0.0.0.0";

/// Default port for the main API server.
pub const DEFAULT_SERVER_PORT: u16 = 8080;
