//! Restart every out-of-date pod in one pass.

use async_trait::async_trait;

use crate::policy::types::{PolicyResult, ReconfigureParams, ReturnedStatus, WorkloadType};
use crate::policy::{ensure_supported, label_pod, list_target_pods, stop_pod, ReconfigurePolicy, PARALLEL};

/// No windowing: all mismatched pods are stopped and labeled in the same
/// invocation. The first failure aborts the rest.
#[derive(Debug, Default)]
pub struct ParallelPolicy;

#[async_trait]
impl ReconfigurePolicy for ParallelPolicy {
    async fn upgrade(&self, params: &ReconfigureParams) -> PolicyResult<ReturnedStatus> {
        ensure_supported(
            PARALLEL,
            params.workload,
            &[
                WorkloadType::Stateful,
                WorkloadType::Consensus,
                WorkloadType::Replication,
            ],
        )?;

        let pods = list_target_pods(params).await?;
        for pod in &pods {
            if pod.is_at_version(&params.config_key, &params.config_version) {
                continue;
            }
            stop_pod(params, pod).await?;
            label_pod(params, pod).await?;
        }

        Ok(ReturnedStatus::converged(pods.len()))
    }

    fn policy_name(&self) -> &'static str {
        PARALLEL
    }
}
