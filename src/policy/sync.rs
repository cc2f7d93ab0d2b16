//! Online update through each replica's command channel.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::policy::types::{
    PolicyError, PolicyResult, ReconfigureParams, ReturnedStatus, WorkloadType,
};
use crate::policy::remote::resolve_address;
use crate::policy::{ensure_supported, label_pod, list_target_pods, ReconfigurePolicy, OPERATOR_SYNC};

/// Pushes `Updated` parameters to every ready pod not yet at the target
/// version. Pods that are not ready wait for a later round.
#[derive(Debug, Default)]
pub struct OperatorSyncPolicy;

#[async_trait]
impl ReconfigurePolicy for OperatorSyncPolicy {
    async fn upgrade(&self, params: &ReconfigureParams) -> PolicyResult<ReturnedStatus> {
        ensure_supported(
            OPERATOR_SYNC,
            params.workload,
            &[
                WorkloadType::Stateful,
                WorkloadType::Consensus,
                WorkloadType::Replication,
            ],
        )?;

        let mut pods = list_target_pods(params).await?;
        let expected = if params.selector.is_empty() {
            params.replicas
        } else {
            pods.retain(|pod| {
                params
                    .selector
                    .iter()
                    .all(|(k, v)| pod.labels.get(k) == Some(v))
            });
            if pods.is_empty() {
                debug!(config = %params.config_key, "no pods match online update selector");
                return Ok(ReturnedStatus::retry(0, 0));
            }
            pods.len()
        };

        let updated = params.updated_parameters();
        let mut progress = 0;
        for pod in &pods {
            if pod.is_at_version(&params.config_key, &params.config_version) {
                progress += 1;
                continue;
            }
            if !pod.ready {
                debug!(pod = %pod.name, "pod not ready, skipping online update this round");
                continue;
            }

            let address = resolve_address(pod, params.sidecar_port)?;
            let client = params
                .client_factory
                .create(&address)
                .map_err(|source| PolicyError::Remote {
                    pod: pod.name.clone(),
                    source,
                })?;
            client
                .online_upgrade_params(&params.config_key, &updated)
                .await
                .map_err(|source| PolicyError::Remote {
                    pod: pod.name.clone(),
                    source,
                })?;
            label_pod(params, pod).await?;
            info!(pod = %pod.name, params = updated.len(), "online update applied");
        }

        if pods.len() == expected && progress == expected {
            Ok(ReturnedStatus::converged(progress))
        } else {
            Ok(ReturnedStatus::retry(progress, expected))
        }
    }

    fn policy_name(&self) -> &'static str {
        OPERATOR_SYNC
    }
}
