//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reconfigurator::diff::ConfigBundle;
use reconfigurator::policy::remote::RemoteResult;
use reconfigurator::policy::{
    version_label_key, ClientFactory, ClusterClient, ClusterError, ClusterResult, ConfigObject, ContainerStatus,
    Pod, ReconfigureClient, RemoteError,
};

/// In-memory orchestrator. Pods are grouped by owning unit.
#[derive(Default)]
pub struct FakeCluster {
    pub pods: Mutex<BTreeMap<String, Vec<Pod>>>,
    pub configs: Mutex<BTreeMap<String, ConfigObject>>,
    pub unit_annotations: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    /// Next N unit-template patches fail with a conflict.
    pub unit_conflicts: AtomicUsize,
    pub label_patches: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn with_unit(unit: &str, pods: Vec<Pod>) -> Arc<Self> {
        let cluster = Self::default();
        cluster.pods.lock().unwrap().insert(unit.to_string(), pods);
        Arc::new(cluster)
    }

    pub fn put_config(&self, name: &str, files: &[(&str, &str)]) {
        let bundle = ConfigBundle::new(
            files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let mut configs = self.configs.lock().unwrap();
        let object = configs.entry(name.to_string()).or_insert_with(|| ConfigObject {
            name: name.to_string(),
            ..Default::default()
        });
        object.bundle = bundle;
    }

    pub fn config(&self, name: &str) -> ConfigObject {
        self.configs.lock().unwrap()[name].clone()
    }

    pub fn pod(&self, name: &str) -> Pod {
        self.pods
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|p| p.name == name)
            .cloned()
            .expect("pod exists")
    }

    pub fn update_pod(&self, name: &str, f: impl FnOnce(&mut Pod)) {
        let mut pods = self.pods.lock().unwrap();
        if let Some(pod) = pods.values_mut().flatten().find(|p| p.name == name) {
            f(pod);
        }
    }

    /// Pod-label versions keyed by pod name.
    pub fn versions(&self, config_key: &str) -> BTreeMap<String, Option<String>> {
        let key = version_label_key(config_key);
        self.pods
            .lock()
            .unwrap()
            .values()
            .flatten()
            .map(|p| (p.name.clone(), p.labels.get(&key).cloned()))
            .collect()
    }

    /// What the orchestrator does after a template change: copy the unit's
    /// template annotations onto `pod` once it has been recreated.
    pub fn recreate_pod(&self, unit: &str, pod_name: &str) {
        let annotations = self
            .unit_annotations
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .unwrap_or_default();
        self.update_pod(pod_name, |pod| {
            pod.annotations.extend(annotations);
            pod.ready = true;
        });
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_pods(&self, unit: &str) -> ClusterResult<Vec<Pod>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .unwrap_or_default())
    }

    async fn patch_pod_labels(&self, pod: &str, labels: &BTreeMap<String, String>) -> ClusterResult<()> {
        let mut pods = self.pods.lock().unwrap();
        let target = pods
            .values_mut()
            .flatten()
            .find(|p| p.name == pod)
            .ok_or_else(|| ClusterError::NotFound(pod.to_string()))?;
        target.labels.extend(labels.clone());
        self.label_patches.lock().unwrap().push(pod.to_string());
        Ok(())
    }

    async fn patch_unit_template_annotations(
        &self,
        unit: &str,
        annotations: &BTreeMap<String, String>,
    ) -> ClusterResult<()> {
        let pending = self.unit_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.unit_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(ClusterError::Conflict(unit.to_string()));
        }
        self.unit_annotations
            .lock()
            .unwrap()
            .entry(unit.to_string())
            .or_default()
            .extend(annotations.clone());
        Ok(())
    }

    async fn get_config(&self, name: &str) -> ClusterResult<ConfigObject> {
        self.configs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))
    }

    async fn patch_config(
        &self,
        name: &str,
        annotations: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<()> {
        let mut configs = self.configs.lock().unwrap();
        let object = configs
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))?;
        object.annotations.extend(annotations.clone());
        object.labels.extend(labels.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Stop { address: String, ids: Vec<String> },
    Online { address: String, config_spec: String, params: BTreeMap<String, String> },
}

/// Records every sidecar call instead of making it.
#[derive(Default)]
pub struct RecordingFactory {
    pub calls: Arc<Mutex<Vec<RemoteCall>>>,
    /// Calls to these addresses fail.
    pub failing: Mutex<BTreeSet<String>>,
}

impl RecordingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }
}

struct RecordingClient {
    address: String,
    calls: Arc<Mutex<Vec<RemoteCall>>>,
    fail: bool,
}

#[async_trait]
impl ReconfigureClient for RecordingClient {
    async fn stop_container(&self, container_ids: &[String]) -> RemoteResult<()> {
        if self.fail {
            return Err(RemoteError::Remote(format!("{} unreachable", self.address)));
        }
        self.calls.lock().unwrap().push(RemoteCall::Stop {
            address: self.address.clone(),
            ids: container_ids.to_vec(),
        });
        Ok(())
    }

    async fn online_upgrade_params(&self, config_spec: &str, params: &BTreeMap<String, String>) -> RemoteResult<()> {
        if self.fail {
            return Err(RemoteError::Remote(format!("{} unreachable", self.address)));
        }
        self.calls.lock().unwrap().push(RemoteCall::Online {
            address: self.address.clone(),
            config_spec: config_spec.to_string(),
            params: params.clone(),
        });
        Ok(())
    }
}

impl ClientFactory for RecordingFactory {
    fn create(&self, address: &str) -> RemoteResult<Box<dyn ReconfigureClient>> {
        Ok(Box::new(RecordingClient {
            address: address.to_string(),
            calls: Arc::clone(&self.calls),
            fail: self.failing.lock().unwrap().contains(address),
        }))
    }
}

/// A ready pod `<unit>-<ordinal>` at 10.0.0.<ordinal+1> with a `mysql`
/// container.
pub fn ready_pod(unit: &str, ordinal: u32) -> Pod {
    Pod {
        name: format!("{unit}-{ordinal}"),
        namespace: "default".to_string(),
        ips: vec![format!("10.0.0.{}", ordinal + 1)],
        ready: true,
        containers: vec![ContainerStatus {
            name: "mysql".to_string(),
            id: format!("containerd://{unit}-{ordinal}-mysql"),
        }],
        ..Default::default()
    }
}

pub fn ready_pods(unit: &str, count: u32) -> Vec<Pod> {
    (0..count).map(|i| ready_pod(unit, i)).collect()
}

/// Reproduce the orchestrator's atomic volume update: write the files into
/// a fresh `..<stamp>` dir, swap `..data` to it, and link each file through
/// `..data`.
#[cfg(unix)]
pub fn write_atomic_volume(dir: &Path, stamp: &str, files: &[(&str, &str)]) -> PathBuf {
    use std::os::unix::fs::symlink;

    let versioned = dir.join(format!("..{stamp}"));
    std::fs::create_dir_all(&versioned).unwrap();
    for (name, content) in files {
        std::fs::write(versioned.join(name), content).unwrap();
    }

    let tmp = dir.join("..data_tmp");
    let _ = std::fs::remove_file(&tmp);
    symlink(format!("..{stamp}"), &tmp).unwrap();
    std::fs::rename(&tmp, dir.join("..data")).unwrap();

    for (name, _) in files {
        let link = dir.join(name);
        if std::fs::symlink_metadata(&link).is_err() {
            symlink(Path::new("..data").join(name), &link).unwrap();
        }
    }
    dir.join("..data")
}
