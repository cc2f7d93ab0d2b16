//! Startup orchestration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::lifecycle::signals::wait_for_shutdown_signal;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::reload::{create_combined_handler, load_descriptor, ConfigHandler, MultiHandler, ReloadError};
use crate::resilience::with_timeout;
use crate::server::{ServerState, SidecarServer};
use crate::watcher::{VolumeWatcher, WatchError};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("metrics: {0}")]
    Metrics(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the multi-handler from the configured descriptor. No descriptor
/// means no handlers; the API still serves stop-container.
pub fn build_handler(config: &ManagerConfig) -> Result<MultiHandler, StartupError> {
    let metas = match &config.watcher.descriptor_path {
        Some(path) => load_descriptor(path)?,
        None => {
            warn!("no descriptor configured, volume reload disabled");
            Vec::new()
        }
    };
    Ok(create_combined_handler(
        &metas,
        config.watcher.backup_path.as_deref(),
        config.command_channel.updater_options(),
    )?)
}

/// Configured volume dirs, or the handlers' mount points when none are set.
pub fn watch_dirs(config: &ManagerConfig, handler: &MultiHandler) -> Vec<PathBuf> {
    let mut dirs = if config.watcher.volume_dirs.is_empty() {
        handler.mount_points()
    } else {
        config.watcher.volume_dirs.clone()
    };
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Run the sidecar until SIGINT/SIGTERM.
pub async fn run(config: ManagerConfig) -> Result<(), StartupError> {
    let handler = Arc::new(build_handler(&config)?);
    info!(config_specs = ?handler.names(), "reload handlers ready");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::Address(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr).await.map_err(StartupError::Metrics)?;
    }

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = SidecarServer::new(
        ServerState {
            handler: handler.clone(),
            stop_command: Arc::new(config.container_runtime.stop_command.clone()),
        },
        config.listener.request_timeout(),
    );
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let dirs = watch_dirs(&config, &handler);
    let watcher_task = if dirs.is_empty() {
        None
    } else {
        let watcher = VolumeWatcher::new(dirs, handler.clone(), config.watcher.retry());
        Some(tokio::spawn(watcher.run(shutdown.subscribe())))
    };

    wait_for_shutdown_signal().await;
    shutdown.trigger();

    let drained = with_timeout(SHUTDOWN_GRACE, async {
        if let Some(task) = watcher_task {
            match task.await {
                Ok(Err(e)) => warn!(error = %e, "volume watcher exited with error"),
                Err(e) => warn!(error = %e, "volume watcher task failed"),
                Ok(Ok(())) => {}
            }
        }
        match server_task.await {
            Ok(Err(e)) => warn!(error = %e, "sidecar API exited with error"),
            Err(e) => warn!(error = %e, "sidecar API task failed"),
            Ok(Ok(())) => {}
        }
    })
    .await;
    if drained.is_err() {
        warn!(grace = ?SHUTDOWN_GRACE, "shutdown deadline passed, exiting anyway");
    }

    info!("shutdown complete");
    Ok(())
}
