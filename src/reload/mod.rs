//! Sidecar reload handlers.
//!
//! # Data Flow
//! ```text
//! descriptor YAML (meta.rs)
//!     → create_combined_handler
//!     → one handler per config spec:
//!           signal.rs   (SIGHUP et al. to the root database process)
//!           shell.rs    (command, per-param or batch, downward-API subs)
//!           template.rs (render script; exec / exec_sql functions)
//!     → multi.rs (route by spec name or longest mount prefix)
//!
//! Volume event:
//!     files.rs scans the mount, diffs against the backup copy
//!     → handler applies changed parameters
//!     → backup refreshed
//! ```
//!
//! # Design Decisions
//! - Each spec keeps its backup under `<backup_root>/<spec name>`
//! - An empty diff never triggers a reload
//! - Online updates go only to the named spec

pub mod files;
pub mod handler;
pub mod meta;
pub mod multi;
pub mod shell;
pub mod signal;
pub mod template;

pub use handler::ConfigHandler;
pub use meta::{load_descriptor, ConfigSpecMeta, ReloadType};
pub use multi::MultiHandler;
pub use shell::ShellHandler;
pub use signal::SignalHandler;
pub use template::TplScriptHandler;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::diff::DiffError;
use crate::updater::{UpdaterError, UpdaterOptions};

#[derive(Debug, Error)]
pub enum ReloadError {
    /// The handler type has no notion of pushing parameters.
    #[error("{0} reload does not support online update")]
    OnlineUpdateNotSupported(&'static str),

    #[error("no reload handler for config spec '{0}'")]
    UnknownConfigSpec(String),

    #[error("unsupported signal '{0}'")]
    UnsupportedSignal(String),

    #[error("process '{0}' not found")]
    ProcessNotFound(String),

    #[error("failed to send {signal} to pid {pid}")]
    SignalFailed { pid: u32, signal: String },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit; carries stderr.
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("invalid descriptor: {0}")]
    Descriptor(String),

    #[error("descriptor yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Updater(#[from] UpdaterError),

    #[error("reload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type ReloadResult<T> = Result<T, ReloadError>;

fn spec_backup_dir(backup_root: Option<&Path>, meta: &ConfigSpecMeta) -> Option<PathBuf> {
    backup_root.map(|root| root.join(&meta.config_spec_name))
}

/// Build one handler per descriptor entry behind a [`MultiHandler`].
pub fn create_combined_handler(
    metas: &[ConfigSpecMeta],
    backup_root: Option<&Path>,
    options: UpdaterOptions,
) -> ReloadResult<MultiHandler> {
    let mut multi = MultiHandler::new();
    for meta in metas {
        let handler: Arc<dyn ConfigHandler> = match meta.reload_type {
            ReloadType::UnixSignal => {
                let trigger = meta.reload_options.unix_signal.as_ref().ok_or_else(|| {
                    ReloadError::Descriptor(format!(
                        "config spec '{}' has no unixSignal options",
                        meta.config_spec_name
                    ))
                })?;
                Arc::new(SignalHandler::new(
                    &trigger.signal,
                    &trigger.process_name,
                    meta.mount_point.clone(),
                )?)
            }
            ReloadType::Shell => Arc::new(ShellHandler::from_meta(meta, spec_backup_dir(backup_root, meta))?),
            ReloadType::TplScript => {
                let tpl_config = meta.tpl_config.as_ref().ok_or_else(|| {
                    ReloadError::Descriptor(format!("config spec '{}' has no tplConfig", meta.config_spec_name))
                })?;
                let backup = spec_backup_dir(backup_root, meta).ok_or_else(|| {
                    ReloadError::Descriptor(format!(
                        "config spec '{}' needs a backup path for template reload",
                        meta.config_spec_name
                    ))
                })?;
                Arc::new(TplScriptHandler::create(
                    &meta.config_spec_name,
                    tpl_config,
                    vec![meta.mount_point.clone()],
                    backup,
                    options,
                )?)
            }
        };
        info!(
            config_spec = %meta.config_spec_name,
            reload_type = meta.reload_type.as_str(),
            mount_point = %meta.mount_point.display(),
            "reload handler registered"
        );
        multi.insert(meta.config_spec_name.clone(), handler);
    }
    Ok(multi)
}
