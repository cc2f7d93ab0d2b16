//! Bounded-concurrency restart driven by the rolling window.

use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::policy::types::{Pod, PolicyResult, ReconfigureParams, ReturnedStatus, WorkloadType};
use crate::policy::window::RollingWindow;
use crate::policy::{ensure_supported, label_pod, list_target_pods, stop_pod, ReconfigurePolicy, ROLLING};

#[derive(Debug, Default)]
pub struct RollingPolicy;

#[async_trait]
impl ReconfigurePolicy for RollingPolicy {
    async fn upgrade(&self, params: &ReconfigureParams) -> PolicyResult<ReturnedStatus> {
        ensure_supported(
            ROLLING,
            params.workload,
            &[
                WorkloadType::Stateful,
                WorkloadType::Consensus,
                WorkloadType::Replication,
            ],
        )?;

        let pods = list_target_pods(params).await?;
        if pods.len() != params.replicas {
            debug!(
                found = pods.len(),
                replicas = params.replicas,
                "pod count does not match replicas, waiting"
            );
            return Ok(ReturnedStatus::retry(0, params.replicas));
        }

        let ordered = restart_order(pods, params.workload);
        let max_rolling = params.max_unavailable.max_rolling(params.replicas);
        let window = RollingWindow::mark(
            &ordered,
            &params.config_key,
            &params.config_version,
            max_rolling,
            params.min_ready,
            SystemTime::now(),
        );

        if window.is_converged() {
            return Ok(ReturnedStatus::converged(params.replicas));
        }
        if !window.is_valid(&ordered) {
            debug!(begin = window.begin, end = window.end, "pods outside window not ready, waiting");
            return Ok(ReturnedStatus::retry(window.stats.updated.len(), params.replicas));
        }

        for pod in window.pods_to_restart(&ordered, &params.config_key, &params.config_version) {
            stop_pod(params, pod).await?;
            label_pod(params, pod).await?;
            info!(pod = %pod.name, "pod restarted in rolling window");
        }

        Ok(ReturnedStatus::retry(window.stats.progress(), params.replicas))
    }

    fn policy_name(&self) -> &'static str {
        ROLLING
    }
}

/// Sort by ordinal. Consensus leaders move to position 0 so they restart last.
pub fn restart_order(mut pods: Vec<Pod>, workload: WorkloadType) -> Vec<Pod> {
    pods.sort_by_key(|pod| (pod.ordinal().unwrap_or(u32::MAX), pod.name.clone()));
    if workload == WorkloadType::Consensus {
        if let Some(pos) = pods.iter().position(Pod::is_leader) {
            let leader = pods.remove(pos);
            pods.insert(0, leader);
        }
    }
    pods
}
