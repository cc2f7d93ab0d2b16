//! Unit-level restart through a pod-template annotation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::policy::types::{restart_annotation_key, PolicyResult, ReconfigureParams, ReturnedStatus};
use crate::policy::{list_target_pods, ReconfigurePolicy, SIMPLE};

/// Stamps the restart annotation on each owning unit and lets the
/// orchestrator roll the pods. Progress is the number of ready pods that
/// carry the stamped annotation.
#[derive(Debug, Default)]
pub struct SimplePolicy;

#[async_trait]
impl ReconfigurePolicy for SimplePolicy {
    async fn upgrade(&self, params: &ReconfigureParams) -> PolicyResult<ReturnedStatus> {
        let key = restart_annotation_key(&params.config_key);
        let version = params.config_version.as_str();
        let annotations = BTreeMap::from([(key.clone(), version.to_string())]);

        for unit in &params.units {
            params
                .cluster
                .patch_unit_template_annotations(unit, &annotations)
                .await?;
        }

        let pods = list_target_pods(params).await?;
        let progress = pods
            .iter()
            .filter(|pod| pod.ready && pod.annotations.get(&key).map(String::as_str) == Some(version))
            .count();
        debug!(config = %params.config_key, progress, replicas = params.replicas, "simple restart progress");

        if pods.len() == params.replicas && progress == params.replicas {
            Ok(ReturnedStatus::converged(progress))
        } else {
            Ok(ReturnedStatus::retry(progress, params.replicas))
        }
    }

    fn policy_name(&self) -> &'static str {
        SIMPLE
    }
}
