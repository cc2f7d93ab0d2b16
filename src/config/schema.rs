//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{select_policy, HttpClientFactory, MaxUnavailable};
use crate::reconcile::RolloutTarget;
use crate::resilience::FixedRetry;
use crate::updater::UpdaterOptions;

/// Root configuration of the config-manager sidecar.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Sidecar API listener.
    pub listener: ListenerConfig,

    /// Watched volumes and reload retry budget.
    pub watcher: WatcherConfig,

    /// Limits for SQL/REST command channels.
    pub command_channel: CommandChannelConfig,

    pub container_runtime: ContainerRuntimeConfig,

    /// Rollout defaults: see [`ReconfigureConfig::rollout_target`].
    pub reconfigure: ReconfigureConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9901").
    pub bind_address: String,

    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9901".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    /// Directories watched for the `..data` swap. Defaults to the mount
    /// points of the descriptor when empty.
    pub volume_dirs: Vec<PathBuf>,

    /// YAML list of config spec descriptors.
    pub descriptor_path: Option<PathBuf>,

    /// Root of per-spec backup copies used for diffing.
    pub backup_path: Option<PathBuf>,

    /// Handler invocations per event before it is dropped.
    pub retry_count: u32,

    pub retry_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            volume_dirs: Vec::new(),
            descriptor_path: None,
            backup_path: None,
            retry_count: 3,
            retry_interval_ms: 1000,
        }
    }
}

impl WatcherConfig {
    pub fn retry(&self) -> FixedRetry {
        FixedRetry::new(self.retry_count, Duration::from_millis(self.retry_interval_ms))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CommandChannelConfig {
    pub call_timeout_secs: u64,

    /// Pooled SQL connections are replaced once older than this.
    pub max_lifetime_secs: u64,
}

impl Default for CommandChannelConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 5,
            max_lifetime_secs: 300,
        }
    }
}

impl CommandChannelConfig {
    pub fn updater_options(&self) -> UpdaterOptions {
        UpdaterOptions {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_lifetime: Duration::from_secs(self.max_lifetime_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ContainerRuntimeConfig {
    /// Program and leading arguments; the container id is appended.
    pub stop_command: Vec<String>,
}

impl Default for ContainerRuntimeConfig {
    fn default() -> Self {
        Self {
            stop_command: vec!["crictl".to_string(), "stop".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReconfigureConfig {
    /// Sidecar API port on each pod.
    pub sidecar_port: u16,

    /// `"2"` or `"25%"`.
    pub max_unavailable: String,

    /// How long a pod must stay ready to count as available.
    pub min_ready_secs: u64,

    /// Restart policy for changes that cannot go online.
    pub default_policy: String,

    pub remote_timeout_secs: u64,
}

impl Default for ReconfigureConfig {
    fn default() -> Self {
        Self {
            sidecar_port: 9901,
            max_unavailable: "1".to_string(),
            min_ready_secs: 0,
            default_policy: crate::policy::SIMPLE.to_string(),
            remote_timeout_secs: 30,
        }
    }
}

impl ReconfigureConfig {
    /// Falls back to the default when the value does not parse; loaded
    /// configs have already been validated.
    pub fn max_unavailable(&self) -> MaxUnavailable {
        self.max_unavailable.parse().unwrap_or_default()
    }

    pub fn min_ready(&self) -> Duration {
        Duration::from_secs(self.min_ready_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Policy for a change, using `default_policy` for restarts.
    pub fn policy_for(&self, dynamic: bool) -> &str {
        select_policy(dynamic, Some(&self.default_policy))
    }

    pub fn client_factory(&self) -> HttpClientFactory {
        HttpClientFactory::new(self.remote_timeout())
    }

    /// Rollout target for `units`, with the configured disruption limits
    /// and sidecar port.
    pub fn rollout_target(&self, units: Vec<String>, replicas: usize, containers: Vec<String>) -> RolloutTarget {
        RolloutTarget {
            units,
            replicas,
            containers,
            max_unavailable: self.max_unavailable(),
            min_ready: self.min_ready(),
            sidecar_port: self.sidecar_port,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9902".to_string(),
        }
    }
}
