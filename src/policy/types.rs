//! Policy engine data model and error definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diff::{updated_parameters, ConfigPatch, ConfigVersion};
use crate::policy::cluster::{ClusterClient, ClusterError};
use crate::policy::remote::{ClientFactory, RemoteError};

/// Outcome of one policy invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecStatus {
    /// Converged.
    None,
    /// Progressing; invoke again later.
    Retry,
    /// Structural failure, terminal for this attempt.
    Failed,
    /// The policy does not handle this workload type.
    NotSupport,
    /// A remote call or patch failed; the whole invocation can be retried.
    FailedAndRetry,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::None => "none",
            ExecStatus::Retry => "retry",
            ExecStatus::Failed => "failed",
            ExecStatus::NotSupport => "not_support",
            ExecStatus::FailedAndRetry => "failed_and_retry",
        }
    }

    /// Whether the caller should re-invoke the same policy later.
    pub fn should_requeue(&self) -> bool {
        matches!(self, ExecStatus::Retry | ExecStatus::FailedAndRetry)
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress report handed back to the caller. Not a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnedStatus {
    pub status: ExecStatus,
    pub succeed_count: i32,
    pub expected_count: i32,
}

impl ReturnedStatus {
    pub fn new(status: ExecStatus, succeed_count: usize, expected_count: usize) -> Self {
        Self {
            status,
            succeed_count: i32::try_from(succeed_count).unwrap_or(i32::MAX),
            expected_count: i32::try_from(expected_count).unwrap_or(i32::MAX),
        }
    }

    pub fn converged(count: usize) -> Self {
        Self::new(ExecStatus::None, count, count)
    }

    pub fn retry(succeed_count: usize, expected_count: usize) -> Self {
        Self::new(ExecStatus::Retry, succeed_count, expected_count)
    }
}

/// Replica topology of the workload being reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadType {
    #[default]
    Stateful,
    Consensus,
    Replication,
    Stateless,
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadType::Stateful => "stateful",
            WorkloadType::Consensus => "consensus",
            WorkloadType::Replication => "replication",
            WorkloadType::Stateless => "stateless",
        };
        f.write_str(s)
    }
}

/// Bound on pods restarted at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxUnavailable {
    Count(u32),
    Percent(u32),
}

impl Default for MaxUnavailable {
    fn default() -> Self {
        MaxUnavailable::Count(1)
    }
}

impl MaxUnavailable {
    /// Concurrent restarts allowed for `replicas` pods, never below 1.
    pub fn max_rolling(&self, replicas: usize) -> usize {
        let n = match *self {
            MaxUnavailable::Count(n) => (n as usize).min(replicas),
            MaxUnavailable::Percent(p) => (p as usize * replicas) / 100,
        };
        n.max(1)
    }
}

impl FromStr for MaxUnavailable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let p: u32 = pct
                .trim()
                .parse()
                .map_err(|_| format!("invalid max unavailable percentage '{s}'"))?;
            if p > 100 {
                return Err(format!("max unavailable percentage {p} exceeds 100"));
            }
            return Ok(MaxUnavailable::Percent(p));
        }
        s.parse()
            .map(MaxUnavailable::Count)
            .map_err(|_| format!("invalid max unavailable '{s}'"))
    }
}

/// A container inside a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub id: String,
}

/// The slice of pod state the policies read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub ips: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub ready: bool,
    pub ready_since: Option<SystemTime>,
    /// Replica role for consensus workloads (`leader`, `follower`, ...).
    pub role: Option<String>,
    pub containers: Vec<ContainerStatus>,
    pub host_network: bool,
    /// Sidecar port published on the host when `host_network` is set.
    pub sidecar_port: Option<u16>,
}

pub const LEADER_ROLE: &str = "leader";

impl Pod {
    /// Numeric suffix after the last `-` in the name.
    pub fn ordinal(&self) -> Option<u32> {
        self.name.rsplit_once('-')?.1.parse().ok()
    }

    pub fn config_version(&self, config_key: &str) -> Option<&str> {
        self.labels
            .get(&version_label_key(config_key))
            .map(String::as_str)
    }

    pub fn is_at_version(&self, config_key: &str, version: &ConfigVersion) -> bool {
        self.config_version(config_key) == Some(version.as_str())
    }

    /// Ready for at least `min_ready`.
    pub fn is_available(&self, min_ready: Duration, now: SystemTime) -> bool {
        if !self.ready {
            return false;
        }
        if min_ready.is_zero() {
            return true;
        }
        match self.ready_since.and_then(|since| since.checked_add(min_ready)) {
            Some(available_at) => available_at <= now,
            None => false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role.as_deref() == Some(LEADER_ROLE)
    }

    pub fn first_ip(&self) -> Option<IpAddr> {
        let parsed: Vec<IpAddr> = self.ips.iter().filter_map(|ip| ip.parse().ok()).collect();
        parsed
            .iter()
            .copied()
            .find(IpAddr::is_ipv4)
            .or_else(|| parsed.first().copied())
    }
}

/// Label recording the config version a pod has applied.
pub fn version_label_key(config_key: &str) -> String {
    format!("reconfigurator.io/config-version-{config_key}")
}

/// Pod-template annotation that makes the orchestrator roll the unit.
pub fn restart_annotation_key(config_key: &str) -> String {
    format!("reconfigurator.io/restart-{config_key}")
}

/// Everything a policy needs for one invocation. Read-only to policies.
#[derive(Clone)]
pub struct ReconfigureParams {
    /// Config spec name; scopes the version label and restart annotation.
    pub config_key: String,
    pub config_version: ConfigVersion,
    pub patch: ConfigPatch,
    pub workload: WorkloadType,
    /// Owning units (StatefulSet equivalents) whose pods are targeted.
    pub units: Vec<String>,
    pub replicas: usize,
    /// Containers to stop on restart.
    pub containers: Vec<String>,
    /// Restricts online updates to matching pods when non-empty.
    pub selector: BTreeMap<String, String>,
    pub max_unavailable: MaxUnavailable,
    pub min_ready: Duration,
    pub sidecar_port: u16,
    pub cluster: Arc<dyn ClusterClient>,
    pub client_factory: Arc<dyn ClientFactory>,
}

impl ReconfigureParams {
    pub fn updated_parameters(&self) -> BTreeMap<String, String> {
        updated_parameters(&self.patch)
    }
}

impl fmt::Debug for ReconfigureParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigureParams")
            .field("config_key", &self.config_key)
            .field("config_version", &self.config_version)
            .field("workload", &self.workload)
            .field("units", &self.units)
            .field("replicas", &self.replicas)
            .finish_non_exhaustive()
    }
}

/// Errors a policy invocation can end with.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("cluster operation failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("remote call to pod {pod} failed: {source}")]
    Remote {
        pod: String,
        #[source]
        source: RemoteError,
    },

    /// Cannot map the config spec to a pod address or container.
    #[error("{0}")]
    Structural(String),

    #[error("policy {policy} does not support {workload} workloads")]
    NotSupported {
        policy: &'static str,
        workload: WorkloadType,
    },

    #[error("unknown upgrade policy '{0}'")]
    UnknownPolicy(String),
}

impl PolicyError {
    /// Position in the error taxonomy.
    pub fn exec_status(&self) -> ExecStatus {
        match self {
            PolicyError::Cluster(_) | PolicyError::Remote { .. } => ExecStatus::FailedAndRetry,
            PolicyError::Structural(_) | PolicyError::UnknownPolicy(_) => ExecStatus::Failed,
            PolicyError::NotSupported { .. } => ExecStatus::NotSupport,
        }
    }

    pub fn to_status(&self, expected_count: usize) -> ReturnedStatus {
        ReturnedStatus::new(self.exec_status(), 0, expected_count)
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huge_min_ready_is_never_available() {
        let pod = Pod {
            name: "pg-0".to_string(),
            ready: true,
            ready_since: Some(SystemTime::now()),
            ..Default::default()
        };
        assert!(!pod.is_available(Duration::MAX, SystemTime::now()));
        assert!(pod.is_available(Duration::ZERO, SystemTime::now()));
    }

    #[test]
    fn test_status_counts_saturate() {
        let status = ReturnedStatus::new(ExecStatus::Retry, usize::MAX, 3);
        assert_eq!(status.succeed_count, i32::MAX);
        assert_eq!(status.expected_count, 3);
    }

    #[test]
    fn test_max_rolling() {
        assert_eq!(MaxUnavailable::Percent(25).max_rolling(3), 1);
        assert_eq!(MaxUnavailable::Percent(50).max_rolling(5), 2);
        assert_eq!(MaxUnavailable::Count(0).max_rolling(3), 1);
        assert_eq!(MaxUnavailable::Count(10).max_rolling(3), 3);
    }

    #[test]
    fn test_max_unavailable_parse() {
        assert_eq!("25%".parse::<MaxUnavailable>(), Ok(MaxUnavailable::Percent(25)));
        assert_eq!("2".parse::<MaxUnavailable>(), Ok(MaxUnavailable::Count(2)));
        assert!("150%".parse::<MaxUnavailable>().is_err());
        assert!("x".parse::<MaxUnavailable>().is_err());
    }

    #[test]
    fn test_pod_ordinal_and_ip() {
        let pod = Pod {
            name: "mysql-cluster-mysql-12".to_string(),
            ips: vec!["fd00::1".to_string(), "10.0.0.5".to_string()],
            ..Default::default()
        };
        assert_eq!(pod.ordinal(), Some(12));
        assert_eq!(pod.first_ip(), Some("10.0.0.5".parse().unwrap()));

        let v6 = Pod {
            ips: vec!["bogus".to_string(), "fd00::1".to_string()],
            ..Default::default()
        };
        assert_eq!(v6.first_ip(), Some("fd00::1".parse().unwrap()));
    }

    #[test]
    fn test_availability_needs_min_ready() {
        let now = SystemTime::now();
        let pod = Pod {
            ready: true,
            ready_since: Some(now - Duration::from_secs(5)),
            ..Default::default()
        };
        assert!(pod.is_available(Duration::from_secs(3), now));
        assert!(!pod.is_available(Duration::from_secs(10), now));
        assert!(pod.is_available(Duration::ZERO, now));
    }

    #[test]
    fn test_error_taxonomy() {
        let err = PolicyError::Structural("no ip".into());
        assert_eq!(err.exec_status(), ExecStatus::Failed);
        let err = PolicyError::NotSupported {
            policy: "rolling",
            workload: WorkloadType::Stateless,
        };
        assert_eq!(err.to_status(3).status, ExecStatus::NotSupport);
    }
}
