//! Dynamic parameter updaters: live command channels into the database.
//!
//! # Data Flow
//!
//! ```text
//! template exec_sql(...) / online update
//!         │
//!         ▼
//! new_updater(engine, dsn) ──► SqlUpdater  (deadpool, max 1 connection)
//!                          └─► RestUpdater (PATCH /config, POST /reload)
//! ```
//!
//! # Design Decisions
//!
//! - Engine selection is by string. An unknown engine is an error, never a
//!   silent no-op.
//! - Every call carries its own deadline, separate from the watcher retry.

pub mod rest;
pub mod sql;

pub use rest::RestUpdater;
pub use sql::SqlUpdater;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::PoolError;
use thiserror::Error;

use crate::resilience::Elapsed;

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("unsupported engine type '{0}'")]
    UnsupportedEngine(String),

    #[error("invalid dsn: {0}")]
    InvalidDsn(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] deadpool_postgres::tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to build connection pool: {0}")]
    PoolBuild(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("command '{command}' is not supported by the {channel} channel")]
    UnsupportedCommand {
        command: String,
        channel: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Timeout(#[from] Elapsed),
}

pub type UpdaterResult<T> = Result<T, UpdaterError>;

/// A live command channel into a running database.
#[async_trait]
pub trait DynamicParamUpdater: Send + Sync {
    /// Execute `command` and return its textual result.
    async fn exec_command(&self, command: &str, args: &[String]) -> UpdaterResult<String>;

    async fn close(&self);
}

/// Connection and call limits shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterOptions {
    pub call_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(300),
        }
    }
}

/// Engine types that have a command channel.
pub const SUPPORTED_ENGINES: &[&str] = &["postgresql", "postgres", "patroni"];

pub fn new_updater(
    engine: &str,
    dsn: &str,
    options: UpdaterOptions,
) -> UpdaterResult<Arc<dyn DynamicParamUpdater>> {
    match engine.to_ascii_lowercase().as_str() {
        "postgresql" | "postgres" => Ok(Arc::new(SqlUpdater::new(dsn, options)?)),
        "patroni" => Ok(Arc::new(RestUpdater::new(dsn, options)?)),
        other => Err(UpdaterError::UnsupportedEngine(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine_is_an_error() {
        let err = new_updater("oracle", "x", UpdaterOptions::default()).err();
        assert!(matches!(err, Some(UpdaterError::UnsupportedEngine(e)) if e == "oracle"));
    }

    #[tokio::test]
    async fn test_known_engines_build_lazily() {
        let options = UpdaterOptions::default();
        assert!(new_updater("postgresql", "host=127.0.0.1 user=postgres", options).is_ok());
        assert!(new_updater("patroni", "http://127.0.0.1:8008", options).is_ok());
    }
}
