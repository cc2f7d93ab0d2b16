use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::reload::ReloadResult;
use crate::watcher::VolumeEvent;

/// A reload action bound to one or more mounted volumes.
#[async_trait]
pub trait ConfigHandler: Send + Sync {
    /// Apply parameters pushed over the API without touching files.
    async fn online_update(&self, name: &str, params: &BTreeMap<String, String>) -> ReloadResult<()>;

    /// React to a change under one of `mount_points`.
    async fn volume_handle(&self, event: &VolumeEvent) -> ReloadResult<()>;

    fn mount_points(&self) -> Vec<PathBuf>;
}

/// Whether `event` lies under any of `mount_points`.
pub fn owns_event(mount_points: &[PathBuf], event: &VolumeEvent) -> bool {
    mount_points.iter().any(|mount| event.path.starts_with(mount))
}
