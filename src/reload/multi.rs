use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::reload::handler::ConfigHandler;
use crate::reload::{ReloadError, ReloadResult};
use crate::watcher::VolumeEvent;

/// Dispatches to per-config-spec handlers.
///
/// Online updates are routed by spec name; volume events by the longest
/// mount point containing the event path.
#[derive(Default, Clone)]
pub struct MultiHandler {
    handlers: BTreeMap<String, Arc<dyn ConfigHandler>>,
}

impl MultiHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: Arc<dyn ConfigHandler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(config_spec = %name, "replacing existing reload handler");
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn owner_of(&self, path: &Path) -> Option<(&str, &Arc<dyn ConfigHandler>)> {
        let mut best: Option<(usize, &str, &Arc<dyn ConfigHandler>)> = None;
        for (name, handler) in &self.handlers {
            for mount in handler.mount_points() {
                if !path.starts_with(&mount) {
                    continue;
                }
                let depth = mount.components().count();
                if best.map_or(true, |(d, _, _)| depth > d) {
                    best = Some((depth, name.as_str(), handler));
                }
            }
        }
        best.map(|(_, name, handler)| (name, handler))
    }
}

#[async_trait]
impl ConfigHandler for MultiHandler {
    async fn online_update(&self, name: &str, params: &BTreeMap<String, String>) -> ReloadResult<()> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ReloadError::UnknownConfigSpec(name.to_string()))?;
        handler.online_update(name, params).await
    }

    async fn volume_handle(&self, event: &VolumeEvent) -> ReloadResult<()> {
        match self.owner_of(&event.path) {
            Some((_, handler)) => handler.volume_handle(event).await,
            None => {
                error!(path = %event.path.display(), "no reload handler owns this volume");
                Ok(())
            }
        }
    }

    fn mount_points(&self) -> Vec<PathBuf> {
        self.handlers
            .values()
            .flat_map(|handler| handler.mount_points())
            .collect()
    }
}
