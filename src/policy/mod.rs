//! Reconfigure policy engine.
//!
//! # Data Flow
//!
//! ```text
//! ReconfigureParams ──► PolicyRegistry::get(name) ──► ReconfigurePolicy::upgrade
//!                                                         │
//!        ClusterClient::list_pods ◄───────────────────────┤
//!        ClientFactory::create(addr) ──► stop_container / online_upgrade_params
//!        ClusterClient::patch_pod_labels (version label) ◄┘
//!                                                         ▼
//!                                                  ReturnedStatus
//! ```
//!
//! # Design Decisions
//!
//! - Policies hold no state. Progress is re-derived from pod labels and
//!   readiness on every call, so any invocation can be repeated safely.
//! - Remote calls are made pod by pod. A failure aborts the invocation
//!   without rollback; the next call resumes from the labels.
//! - The registry is a value built at startup, not a global.

pub mod cluster;
pub mod parallel;
pub mod remote;
pub mod rolling;
pub mod simple;
pub mod sync;
pub mod types;
pub mod window;

pub use cluster::{ClusterClient, ClusterError, ClusterResult, ConfigObject};
pub use remote::{ClientFactory, HttpClientFactory, ReconfigureClient, RemoteError};
pub use types::{
    restart_annotation_key, version_label_key, ContainerStatus, ExecStatus, MaxUnavailable, Pod,
    PolicyError, PolicyResult, ReconfigureParams, ReturnedStatus, WorkloadType,
};
pub use window::{PodStats, RollingWindow};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::policy::remote::{resolve_address, resolve_container_ids};

pub const PARALLEL: &str = "parallel";
pub const ROLLING: &str = "rolling";
pub const SIMPLE: &str = "simple";
pub const OPERATOR_SYNC: &str = "operatorSyncUpdate";

/// Capability shared by every reconfigure policy.
#[async_trait]
pub trait ReconfigurePolicy: Send + Sync {
    /// Drive one round of the rollout.
    ///
    /// `Ok` carries `None` (converged) or `Retry` (progressing); errors map
    /// to the remaining statuses through [`PolicyError::exec_status`].
    async fn upgrade(&self, params: &ReconfigureParams) -> PolicyResult<ReturnedStatus>;

    fn policy_name(&self) -> &'static str;
}

/// Policies keyed by upgrade-policy identifier.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<&'static str, Arc<dyn ReconfigurePolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four built-in policies.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(parallel::ParallelPolicy));
        registry.register(Arc::new(rolling::RollingPolicy));
        registry.register(Arc::new(simple::SimplePolicy));
        registry.register(Arc::new(sync::OperatorSyncPolicy));
        registry
    }

    pub fn register(&mut self, policy: Arc<dyn ReconfigurePolicy>) {
        self.policies.insert(policy.policy_name(), policy);
    }

    pub fn get(&self, name: &str) -> PolicyResult<Arc<dyn ReconfigurePolicy>> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownPolicy(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.policies.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Dynamic changes go online; everything else uses the requested restart
/// policy, `simple` when none is requested.
pub fn select_policy(dynamic: bool, requested: Option<&str>) -> &str {
    if dynamic {
        return OPERATOR_SYNC;
    }
    match requested {
        Some(name) if !name.is_empty() => name,
        _ => SIMPLE,
    }
}

pub(crate) fn ensure_supported(
    policy: &'static str,
    workload: WorkloadType,
    supported: &[WorkloadType],
) -> PolicyResult<()> {
    if supported.contains(&workload) {
        Ok(())
    } else {
        Err(PolicyError::NotSupported { policy, workload })
    }
}

/// Pods of every target unit.
pub(crate) async fn list_target_pods(params: &ReconfigureParams) -> PolicyResult<Vec<Pod>> {
    let mut pods = Vec::new();
    for unit in &params.units {
        pods.extend(params.cluster.list_pods(unit).await?);
    }
    Ok(pods)
}

/// Stop the configured containers of `pod` through its sidecar.
pub(crate) async fn stop_pod(params: &ReconfigureParams, pod: &Pod) -> PolicyResult<()> {
    let address = resolve_address(pod, params.sidecar_port)?;
    let ids = resolve_container_ids(pod, &params.containers)?;
    let remote_err = |source: RemoteError| PolicyError::Remote {
        pod: pod.name.clone(),
        source,
    };

    let client = params.client_factory.create(&address).map_err(remote_err)?;
    client.stop_container(&ids).await.map_err(remote_err)?;
    debug!(pod = %pod.name, containers = ?ids, "containers stopped");
    Ok(())
}

/// Record the target version on `pod`.
pub(crate) async fn label_pod(params: &ReconfigureParams, pod: &Pod) -> PolicyResult<()> {
    let labels = BTreeMap::from([(
        version_label_key(&params.config_key),
        params.config_version.to_string(),
    )]);
    params.cluster.patch_pod_labels(&pod.name, &labels).await?;
    Ok(())
}
