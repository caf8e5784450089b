// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use clap::{Parser, Subcommand};
use fabrica::config::FabricaConfig;
use fabrica::constants::TOKIO_WORKER_THREADS;
use fabrica::context::AppContext;
use fabrica::events::EventBus;
use fabrica::http::{self, KindConfig};
use fabrica::policy::{Permissive, PolicyRegistry};
use fabrica::reconcile::Controller;
use fabrica::resource::{ConditionStatus, Resource};
use fabrica::storage::file::FileStorage;
use fabrica::storage::Storage;
use fabrica::version_registry::VersionRegistry;
use tracing::info;

/// Fabrica: a toolkit for Kubernetes-shaped REST services.
#[derive(Parser, Debug)]
#[command(name = "fabrica", version, about)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `storage.dataDir`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override `server.bindAddress`.
    #[arg(long, global = true)]
    bind_address: Option<String>,

    /// Override `server.port`.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server. The default when no subcommand is given.
    Serve,
    /// Print the effective configuration (defaults + file + env) as YAML and exit.
    ShowConfig,
}

/// Example [`fabrica::reconcile::Reconciler`] that brings every `Device` to a
/// `Ready` condition; stands in for the kind-specific reconcilers a real
/// deployment of this toolkit would register.
struct DeviceReconciler;

#[async_trait::async_trait]
impl fabrica::reconcile::Reconciler for DeviceReconciler {
    fn kind(&self) -> &str {
        "Device"
    }

    async fn reconcile(&self, resource: &mut Resource) -> anyhow::Result<fabrica::reconcile::ReconcileOutcome> {
        resource.set_condition("Ready", ConditionStatus::True, Some("Reconciled".to_string()), None);
        Ok(fabrica::reconcile::ReconcileOutcome::done())
    }
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("fabrica-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = FabricaConfig::load(cli.config.as_deref())?;

    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.display().to_string();
    }
    if let Some(bind_address) = &cli.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    initialize_logging(&config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

/// Initialize structured logging. Respects `RUST_LOG` (falls back to the
/// configured level) and `logging.format`/`FABRICA_LOG_FORMAT` for the
/// output shape.
fn initialize_logging(config: &FabricaConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    match config.logging.format {
        fabrica::config::LogFormat::Json => subscriber.json().init(),
        fabrica::config::LogFormat::Text => subscriber.init(),
    }
}

async fn serve(config: FabricaConfig) -> Result<()> {
    let config = Arc::new(config);

    if config.storage.kind != fabrica::config::StorageKind::File {
        anyhow::bail!("storage backend {:?} is not implemented by this binary", config.storage.kind);
    }
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(config.storage.data_dir.clone()));

    let versions = Arc::new(VersionRegistry::new());
    versions.register_version("Device", "v1", true, false);

    let events = Arc::new(EventBus::new(config.events.to_bus_config()));
    let policies = Arc::new(PolicyRegistry::new(Arc::new(Permissive)));
    let reconcile = Arc::new(Controller::new(storage.clone(), events.clone(), config.reconciliation.worker_count));
    reconcile.register(Arc::new(DeviceReconciler)).await;

    let context = AppContext::new(config.clone(), storage, versions, events.clone(), policies, reconcile.clone());

    // Initialization order matters: kinds are registered above, then the
    // event bus and controller are started, then the HTTP server begins
    // accepting connections.
    events.start().await;
    if config.reconciliation.enabled {
        reconcile.start(&config.events.event_type_prefix).await;
    }

    let kinds = vec![KindConfig::new("Device", "devices", "v1").with_versioning()];
    let app = Router::new()
        .route(&config.server.metrics_path, get(metrics_handler))
        .merge(http::router(context, kinds));

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port).parse()?;
    info!(%addr, "fabrica server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    reconcile.stop(std::time::Duration::from_secs(5)).await;
    events.close().await;
    Ok(())
}

async fn metrics_handler() -> Result<String, axum::http::StatusCode> {
    fabrica::metrics::gather_metrics().map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
