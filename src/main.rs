//! config-manager: per-replica reconfiguration sidecar.
//!
//! ```text
//!   mounted config volume                       policy engine (remote)
//!          │ ..data swap                                 │
//!          ▼                                             ▼
//!   ┌──────────────┐   ┌───────────────┐      ┌──────────────────────┐
//!   │VolumeWatcher │──▶│ MultiHandler  │◀─────│ sidecar API (axum)   │
//!   │filter + retry│   │ signal/shell/ │      │ stop-container       │
//!   └──────────────┘   │ template      │      │ online-update        │
//!                      └──────┬────────┘      └──────────────────────┘
//!                             │ exec_sql / REST
//!                             ▼
//!                      database process
//! ```

use std::path::PathBuf;

use clap::Parser;

use reconfigurator::config::{load_config, validate_config, ManagerConfig};
use reconfigurator::lifecycle;
use reconfigurator::observability::logging;

#[derive(Parser)]
#[command(name = "config-manager")]
#[command(about = "Watches mounted config volumes and reloads the database in place", long_about = None)]
struct Args {
    /// TOML config file; defaults apply when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sidecar API bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Directory to watch, repeatable.
    #[arg(long = "volume-dir")]
    volume_dirs: Vec<PathBuf>,

    /// Config spec descriptor (YAML).
    #[arg(long)]
    descriptor: Option<PathBuf>,

    /// Root directory for backup copies.
    #[arg(long)]
    backup_path: Option<PathBuf>,

    #[arg(long)]
    retry_count: Option<u32>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ManagerConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if !self.volume_dirs.is_empty() {
            config.watcher.volume_dirs = self.volume_dirs;
        }
        if self.descriptor.is_some() {
            config.watcher.descriptor_path = self.descriptor;
        }
        if self.backup_path.is_some() {
            config.watcher.backup_path = self.backup_path;
        }
        if let Some(count) = self.retry_count {
            config.watcher.retry_count = count;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = Args::parse();

    let mut config = match args.config.take() {
        Some(path) => load_config(&path)?,
        None => ManagerConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("invalid configuration: {e}");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        descriptor = ?config.watcher.descriptor_path,
        retry_count = config.watcher.retry_count,
        "config-manager starting"
    );

    lifecycle::run(config).await?;
    Ok(())
}
