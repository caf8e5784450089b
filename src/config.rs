// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Layered runtime configuration: defaults, then an optional YAML file, then
//! environment variable overrides, in that order.
//!
//! Mirrors the teacher's `constants.rs` catalogue for defaults and its
//! `main.rs` `std::env::var(...).ok().and_then(...).unwrap_or(...)` pattern
//! for overrides, generalized into one structured, serializable document
//! instead of scattered free functions.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONDITION_EVENT_PREFIX, DEFAULT_EVENT_BUFFER_SIZE, DEFAULT_EVENT_SOURCE,
    DEFAULT_EVENT_TYPE_PREFIX, DEFAULT_EVENT_WORKERS, DEFAULT_RECONCILE_WORKERS,
    DEFAULT_SERVER_BIND_ADDRESS, DEFAULT_SERVER_PORT, METRICS_SERVER_PATH,
    RECONCILE_INITIAL_INTERVAL_MILLIS,
};
use crate::events::EventBusConfig;

/// Top-level configuration document, loaded from defaults, an optional YAML
/// file, then environment variables (highest precedence).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricaConfig {
    /// Event bus configuration.
    pub events: EventsConfig,
    /// Reconciliation controller configuration.
    pub reconciliation: ReconciliationConfig,
    /// Storage backend configuration.
    pub storage: StorageConfig,
    /// Validation engine configuration.
    pub validation: ValidationConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
}

impl Default for FabricaConfig {
    fn default() -> Self {
        Self {
            events: EventsConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            storage: StorageConfig::default(),
            validation: ValidationConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl FabricaConfig {
    /// Load configuration from (in increasing precedence): built-in
    /// defaults, an optional YAML file at `path` (if it exists), then
    /// `FABRICA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` exists but cannot be read or parsed as
    /// YAML.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&raw)?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.events.apply_env_overrides();
        self.reconciliation.apply_env_overrides();
        self.storage.apply_env_overrides();
        self.validation.apply_env_overrides();
        self.logging.apply_env_overrides();
        self.server.apply_env_overrides();
    }
}

fn env_bool(key: &str, current: bool) -> bool {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(current)
}

fn env_parsed<T: std::str::FromStr>(key: &str, current: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(current)
}

fn env_string(key: &str, current: String) -> String {
    std::env::var(key).unwrap_or(current)
}

/// `events.*` configuration surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventsConfig {
    /// Whether the event bus publishes anything at all.
    pub enabled: bool,
    /// Whether lifecycle (`created`/`updated`/`deleted`) events are emitted.
    pub lifecycle_events_enabled: bool,
    /// Whether condition-transition events are emitted.
    pub condition_events_enabled: bool,
    /// `type` prefix for lifecycle events.
    pub event_type_prefix: String,
    /// `type` prefix for condition events.
    pub condition_event_prefix: String,
    /// CloudEvents `source` attribute.
    pub source: String,
    /// Bounded ring-buffer capacity.
    pub buffer_size: usize,
    /// Number of concurrent delivery workers.
    pub workers: usize,
}

impl Default for EventsConfig {
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

impl EventsConfig {
    fn apply_env_overrides(&mut self) {
        self.enabled = env_bool("FABRICA_EVENTS_ENABLED", self.enabled);
        self.lifecycle_events_enabled =
            env_bool("FABRICA_EVENTS_LIFECYCLE_ENABLED", self.lifecycle_events_enabled);
        self.condition_events_enabled =
            env_bool("FABRICA_EVENTS_CONDITION_ENABLED", self.condition_events_enabled);
        self.event_type_prefix =
            env_string("FABRICA_EVENTS_TYPE_PREFIX", std::mem::take(&mut self.event_type_prefix));
        self.condition_event_prefix = env_string(
            "FABRICA_EVENTS_CONDITION_PREFIX",
            std::mem::take(&mut self.condition_event_prefix),
        );
        self.source = env_string("FABRICA_EVENTS_SOURCE", std::mem::take(&mut self.source));
        self.buffer_size = env_parsed("FABRICA_EVENTS_BUFFER_SIZE", self.buffer_size);
        self.workers = env_parsed("FABRICA_EVENTS_WORKERS", self.workers);
    }

    /// Convert into the [`EventBusConfig`] the event bus itself consumes.
    #[must_use]
    pub fn to_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            enabled: self.enabled,
            lifecycle_events_enabled: self.lifecycle_events_enabled,
            condition_events_enabled: self.condition_events_enabled,
            event_type_prefix: self.event_type_prefix.clone(),
            condition_event_prefix: self.condition_event_prefix.clone(),
            source: self.source.clone(),
            buffer_size: self.buffer_size,
            workers: self.workers,
        }
    }
}

/// `reconciliation.*` configuration surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconciliationConfig {
    /// Whether the reconciliation controller runs at all.
    pub enabled: bool,
    /// Number of concurrent reconcile workers.
    pub worker_count: usize,
    /// Default requeue delay, in milliseconds, for a successful reconcile
    /// with no explicit `requeue_after`.
    pub requeue_delay_millis: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_count: DEFAULT_RECONCILE_WORKERS,
            requeue_delay_millis: RECONCILE_INITIAL_INTERVAL_MILLIS,
        }
    }
}

impl ReconciliationConfig {
    fn apply_env_overrides(&mut self) {
        self.enabled = env_bool("FABRICA_RECONCILE_ENABLED", self.enabled);
        self.worker_count = env_parsed("FABRICA_RECONCILE_WORKERS", self.worker_count);
        self.requeue_delay_millis =
            env_parsed("FABRICA_RECONCILE_REQUEUE_DELAY_MILLIS", self.requeue_delay_millis);
    }

    /// The default requeue delay as a [`Duration`].
    #[must_use]
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_millis)
    }
}

/// The storage backend kind, from `storage.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// JSON-file-per-resource storage under `storage.dataDir`.
    File,
    /// SQL-backed storage at `storage.databaseUrl`.
    Sql,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::File
    }
}

/// `storage.*` configuration surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Which backend to use.
    #[serde(rename = "type")]
    pub kind: StorageKind,
    /// Base directory for the file backend.
    pub data_dir: String,
    /// Connection string for the SQL backend.
    pub database_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { kind: StorageKind::File, data_dir: "./data".to_string(), database_url: None }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(kind) = std::env::var("FABRICA_STORAGE_TYPE") {
            self.kind = match kind.to_lowercase().as_str() {
                "sql" => StorageKind::Sql,
                _ => StorageKind::File,
            };
        }
        self.data_dir = env_string("FABRICA_STORAGE_DATA_DIR", std::mem::take(&mut self.data_dir));
        if let Ok(url) = std::env::var("FABRICA_STORAGE_DATABASE_URL") {
            self.database_url = Some(url);
        }
    }
}

/// Validation strictness, from `validation.mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Unknown/foreign fields are rejected.
    Strict,
    /// Unknown/foreign fields are dropped with a warning.
    Lenient,
}

impl Default for ValidationMode {
    fn default() -> Self {
        Self::Lenient
    }
}

/// `validation.*` configuration surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Strictness mode.
    pub mode: ValidationMode,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { mode: ValidationMode::Lenient }
    }
}

impl ValidationConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("FABRICA_VALIDATION_MODE") {
            self.mode = match mode.to_lowercase().as_str() {
                "strict" => ValidationMode::Strict,
                _ => ValidationMode::Lenient,
            };
        }
    }

    /// Whether a foreign/unknown field should be rejected outright rather
    /// than dropped with a warning.
    #[must_use]
    pub fn reject_foreign_fields(&self) -> bool {
        self.mode == ValidationMode::Strict
    }
}

/// Log output format, from `logging.format`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact, human-readable text (the default for local development).
    Text,
    /// Structured JSON, one object per line.
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Text
    }
}

/// `logging.*` configuration surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, e.g. `"info"` or `"fabrica=debug"`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Text }
    }
}

impl LoggingConfig {
    fn apply_env_overrides(&mut self) {
        // RUST_LOG is the idiomatic tracing-subscriber convention and takes
        // precedence over the Fabrica-specific key, matching the teacher.
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.level = level;
        } else {
            self.level = env_string("FABRICA_LOGGING_LEVEL", std::mem::take(&mut self.level));
        }
        if let Ok(format) = std::env::var("FABRICA_LOG_FORMAT") {
            self.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            };
        }
    }
}

/// `server.*` configuration surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address for the HTTP server.
    pub bind_address: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Path at which Prometheus metrics are served.
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_SERVER_BIND_ADDRESS.to_string(),
            port: DEFAULT_SERVER_PORT,
            metrics_path: METRICS_SERVER_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    fn apply_env_overrides(&mut self) {
        self.bind_address =
            env_string("FABRICA_SERVER_BIND_ADDRESS", std::mem::take(&mut self.bind_address));
        self.port = env_parsed("FABRICA_SERVER_PORT", self.port);
        self.metrics_path =
            env_string("FABRICA_SERVER_METRICS_PATH", std::mem::take(&mut self.metrics_path));
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
