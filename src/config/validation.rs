//! Configuration validation.
//!
//! Returns every problem at once; runs before the config is accepted.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ManagerConfig;
use crate::policy::{MaxUnavailable, PolicyRegistry};

/// One semantic problem, keyed by the dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    if config.watcher.retry_count == 0 {
        errors.push(ValidationError::new("watcher.retry_count", "must be > 0"));
    }
    for dir in &config.watcher.volume_dirs {
        if !dir.is_absolute() {
            errors.push(ValidationError::new(
                "watcher.volume_dirs",
                format!("'{}' must be absolute", dir.display()),
            ));
        }
    }

    if config.command_channel.call_timeout_secs == 0 {
        errors.push(ValidationError::new("command_channel.call_timeout_secs", "must be > 0"));
    }

    if config.container_runtime.stop_command.is_empty() {
        errors.push(ValidationError::new("container_runtime.stop_command", "must not be empty"));
    }

    if config.reconfigure.sidecar_port == 0 {
        errors.push(ValidationError::new("reconfigure.sidecar_port", "must be > 0"));
    }
    if let Err(e) = config.reconfigure.max_unavailable.parse::<MaxUnavailable>() {
        errors.push(ValidationError::new("reconfigure.max_unavailable", e));
    }
    if PolicyRegistry::with_defaults()
        .get(&config.reconfigure.default_policy)
        .is_err()
    {
        errors.push(ValidationError::new(
            "reconfigure.default_policy",
            format!("unknown policy '{}'", config.reconfigure.default_policy),
        ));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {}", config.observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
