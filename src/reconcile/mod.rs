//! Reconcile entry point for one config object.
//!
//! # Data Flow
//! ```text
//! ClusterClient::get_config
//!     → ConfigValidator (reject before any pod work)
//!     → last-applied annotation → old bundle
//!     → diff_bundles(old, new) → ConfigPatch
//!     → unchanged? return None
//!     → ParameterClassification::is_dynamic
//!     → select_policy → PolicyRegistry::get → upgrade
//!     → None? persist last-applied + version label
//! ```
//!
//! # Design Decisions
//! - Policy failures become a `ReturnedStatus`, never an `Err`; errors are
//!   reserved for problems found before the rollout starts
//! - The last-applied annotation is written only after convergence, so an
//!   interrupted rollout is diffed against the same base next time

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ReconfigureConfig;
use crate::diff::{
    diff_bundles, AcceptAll, ConfigBundle, ConfigDescription, ConfigValidator, ConfigVersion, DiffError,
    ParameterClassification,
};
use crate::observability::metrics;
use crate::policy::{
    select_policy, ClientFactory, ClusterClient, ClusterError, ConfigObject, ExecStatus, MaxUnavailable,
    PolicyError, PolicyRegistry, ReconfigureParams, ReturnedStatus, WorkloadType,
};

/// Annotation holding the JSON map (file → content) last rolled out.
pub const LAST_APPLIED_ANNOTATION: &str = "reconfigurator.io/last-applied-configuration";

/// Label holding the `ConfigVersion` of the last converged rollout.
pub const CONFIG_VERSION_LABEL: &str = "reconfigurator.io/config-version";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("malformed last-applied annotation on '{name}': {source}")]
    LastApplied {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Workload the config object is rolled out to.
#[derive(Debug, Clone, Default)]
pub struct RolloutTarget {
    pub workload: WorkloadType,
    pub units: Vec<String>,
    pub replicas: usize,
    pub containers: Vec<String>,
    pub selector: BTreeMap<String, String>,
    pub max_unavailable: MaxUnavailable,
    pub min_ready: Duration,
    pub sidecar_port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileRequest {
    /// Name of the config object in the orchestrator.
    pub config_name: String,
    /// Config spec name; scopes pod labels and annotations.
    pub config_key: String,
    pub descriptions: Vec<ConfigDescription>,
    pub classification: ParameterClassification,
    /// Restart policy for non-dynamic changes.
    pub requested_policy: Option<String>,
    pub target: RolloutTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub version: ConfigVersion,
    /// Policy that ran, absent when nothing changed.
    pub policy: Option<&'static str>,
    pub dynamic: bool,
    pub status: ReturnedStatus,
    /// Failure reported by the policy, if any.
    pub message: Option<String>,
}

pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    client_factory: Arc<dyn ClientFactory>,
    registry: PolicyRegistry,
    validator: Arc<dyn ConfigValidator>,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        client_factory: Arc<dyn ClientFactory>,
        registry: PolicyRegistry,
    ) -> Self {
        Self {
            cluster,
            client_factory,
            registry,
            validator: Arc::new(AcceptAll),
        }
    }

    /// Reconciler reaching sidecars over HTTP with the configured timeout.
    pub fn from_config(cluster: Arc<dyn ClusterClient>, config: &ReconfigureConfig) -> Self {
        Self::new(
            cluster,
            Arc::new(config.client_factory()),
            PolicyRegistry::with_defaults(),
        )
    }

    pub fn with_validator(mut self, validator: Arc<dyn ConfigValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Run one pass. Safe to call again with the same request until the
    /// outcome status is `None`.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconcileResult<ReconcileOutcome> {
        let object = self.cluster.get_config(&request.config_name).await?;
        self.validator
            .validate(&object.bundle)
            .map_err(DiffError::Validation)?;

        let old = last_applied(&object)?;
        let patch = diff_bundles(&old, &object.bundle, &request.descriptions)?;
        let version = ConfigVersion::of(&object.bundle);

        if !patch.is_modify {
            info!(config = %request.config_name, version = %version, "config unchanged");
            return Ok(ReconcileOutcome {
                version,
                policy: None,
                dynamic: false,
                status: ReturnedStatus::converged(0),
                message: None,
            });
        }

        let dynamic = request.classification.is_dynamic(&patch);
        let policy = self
            .registry
            .get(select_policy(dynamic, request.requested_policy.as_deref()))?;
        let policy_name = policy.policy_name();

        let target = &request.target;
        let params = ReconfigureParams {
            config_key: request.config_key.clone(),
            config_version: version.clone(),
            patch,
            workload: target.workload,
            units: target.units.clone(),
            replicas: target.replicas,
            containers: target.containers.clone(),
            selector: target.selector.clone(),
            max_unavailable: target.max_unavailable,
            min_ready: target.min_ready,
            sidecar_port: target.sidecar_port,
            cluster: Arc::clone(&self.cluster),
            client_factory: Arc::clone(&self.client_factory),
        };

        let (status, message) = match policy.upgrade(&params).await {
            Ok(status) => (status, None),
            Err(e) => {
                warn!(config = %request.config_name, policy = policy_name, error = %e, "policy invocation failed");
                (e.to_status(target.replicas), Some(e.to_string()))
            }
        };
        metrics::record_policy_invocation(policy_name, status.status.as_str());
        info!(
            config = %request.config_name,
            policy = policy_name,
            dynamic,
            version = %version,
            status = %status.status,
            succeed = status.succeed_count,
            expected = status.expected_count,
            "reconfigure round finished"
        );

        if status.status == ExecStatus::None {
            self.persist(&object, &version).await?;
        }

        Ok(ReconcileOutcome {
            version,
            policy: Some(policy_name),
            dynamic,
            status,
            message,
        })
    }

    async fn persist(&self, object: &ConfigObject, version: &ConfigVersion) -> ReconcileResult<()> {
        let applied = serde_json::to_string(&object.bundle.files).map_err(|source| ReconcileError::LastApplied {
            name: object.name.clone(),
            source,
        })?;
        let annotations = BTreeMap::from([(LAST_APPLIED_ANNOTATION.to_string(), applied)]);
        let labels = BTreeMap::from([(CONFIG_VERSION_LABEL.to_string(), version.to_string())]);
        self.cluster
            .patch_config(&object.name, &annotations, &labels)
            .await?;
        Ok(())
    }
}

/// The bundle recorded by the last converged rollout; empty when absent.
pub fn last_applied(object: &ConfigObject) -> ReconcileResult<ConfigBundle> {
    match object.annotations.get(LAST_APPLIED_ANNOTATION) {
        Some(raw) if !raw.is_empty() => {
            let files: BTreeMap<String, String> =
                serde_json::from_str(raw).map_err(|source| ReconcileError::LastApplied {
                    name: object.name.clone(),
                    source,
                })?;
            Ok(ConfigBundle::new(files))
        }
        _ => Ok(ConfigBundle::default()),
    }
}
