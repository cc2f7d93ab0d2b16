//! Rolling window cursor.
//!
//! Pods are ordered by restart priority: the last position is restarted
//! first. The window `[begin, end)` holds the pods eligible this round.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use crate::diff::ConfigVersion;
use crate::policy::types::Pod;

/// Per-invocation classification of the pod set, keyed by pod name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodStats {
    pub ready: BTreeSet<String>,
    pub available: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub updating: BTreeSet<String>,
}

impl PodStats {
    pub fn collect(pods: &[Pod], min_ready: Duration, now: SystemTime) -> Self {
        let mut stats = PodStats::default();
        for pod in pods {
            if pod.ready {
                stats.ready.insert(pod.name.clone());
            }
            if pod.is_available(min_ready, now) {
                stats.available.insert(pod.name.clone());
            }
        }
        stats
    }

    /// Pods counted as done or in flight.
    pub fn progress(&self) -> usize {
        self.updated.len() + self.updating.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingWindow {
    pub begin: usize,
    pub end: usize,
    pub stats: PodStats,
}

impl RollingWindow {
    /// Mark the window for `pods`, already in restart order.
    pub fn mark(
        pods: &[Pod],
        config_key: &str,
        version: &ConfigVersion,
        max_rolling: usize,
        min_ready: Duration,
        now: SystemTime,
    ) -> Self {
        let mut stats = PodStats::collect(pods, min_ready, now);

        let mut end = 0;
        for (i, pod) in pods.iter().enumerate().rev() {
            if !pod.is_at_version(config_key, version) {
                end = i + 1;
                break;
            }
            if !stats.available.contains(&pod.name) {
                stats.updating.insert(pod.name.clone());
                end = i + 1;
                break;
            }
            stats.updated.insert(pod.name.clone());
        }

        let begin = end.saturating_sub(max_rolling.max(1));
        for pod in &pods[begin..end] {
            if !pod.is_at_version(config_key, version) {
                stats.updating.insert(pod.name.clone());
            }
        }

        Self { begin, end, stats }
    }

    /// Every pod before the window and every updated pod must be ready.
    pub fn is_valid(&self, pods: &[Pod]) -> bool {
        let prefix_ready = pods[..self.begin.min(pods.len())]
            .iter()
            .all(|pod| self.stats.ready.contains(&pod.name));
        let updated_ready = self
            .stats
            .updated
            .iter()
            .all(|name| self.stats.ready.contains(name));
        prefix_ready && updated_ready
    }

    /// Every pod is at the target version and available.
    pub fn is_converged(&self) -> bool {
        self.end == 0
    }

    /// Old-version pods inside the window, highest position first.
    pub fn pods_to_restart<'a>(
        &self,
        pods: &'a [Pod],
        config_key: &str,
        version: &ConfigVersion,
    ) -> Vec<&'a Pod> {
        pods[self.begin..self.end]
            .iter()
            .rev()
            .filter(|pod| !pod.is_at_version(config_key, version))
            .collect()
    }
}
