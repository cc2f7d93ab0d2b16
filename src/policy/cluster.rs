//! Orchestrator collaborator: pod listing and object patching.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::diff::ConfigBundle;
use crate::policy::types::Pod;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency conflict on patch.
    #[error("conflict patching {0}")]
    Conflict(String),

    #[error("orchestrator api error: {0}")]
    Api(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// A config object as stored by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigObject {
    pub name: String,
    pub bundle: ConfigBundle,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// Namespace-scoped view of the orchestrator.
///
/// Patches use merge semantics: only the given keys change.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_pods(&self, unit: &str) -> ClusterResult<Vec<Pod>>;

    async fn patch_pod_labels(
        &self,
        pod: &str,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<()>;

    async fn patch_unit_template_annotations(
        &self,
        unit: &str,
        annotations: &BTreeMap<String, String>,
    ) -> ClusterResult<()>;

    async fn get_config(&self, name: &str) -> ClusterResult<ConfigObject>;

    async fn patch_config(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<()>;
}
