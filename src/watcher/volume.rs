//! The watch loop.

use std::path::PathBuf;
use std::sync::Arc;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::observability::metrics;
use crate::reload::ConfigHandler;
use crate::resilience::FixedRetry;
use crate::watcher::{FilterChain, VolumeEvent, WatchError, WatchResult};

/// What became of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Filtered,
    Handled,
    /// The handler kept failing until the retry budget ran out.
    Dropped,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Filtered => "filtered",
            EventOutcome::Handled => "handled",
            EventOutcome::Dropped => "dropped",
        }
    }
}

pub struct VolumeWatcher {
    dirs: Vec<PathBuf>,
    filters: FilterChain,
    handler: Arc<dyn ConfigHandler>,
    retry: FixedRetry,
}

impl VolumeWatcher {
    pub fn new(dirs: Vec<PathBuf>, handler: Arc<dyn ConfigHandler>, retry: FixedRetry) -> Self {
        Self {
            dirs,
            filters: FilterChain::default(),
            handler,
            retry,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Filter, then dispatch with the retry budget. Never fails: an event
    /// the handler cannot process is logged and dropped.
    pub async fn process_event(&self, event: &VolumeEvent) -> EventOutcome {
        if !self.filters.accept(event) {
            debug!(path = %event.path.display(), kind = event.kind.as_str(), "event filtered");
            metrics::record_volume_event(EventOutcome::Filtered.as_str());
            return EventOutcome::Filtered;
        }

        info!(path = %event.path.display(), kind = event.kind.as_str(), "volume changed");
        let handler = &self.handler;
        let result = self
            .retry
            .run(|attempt| async move {
                let result = handler.volume_handle(event).await;
                metrics::record_handler_attempt(result.is_ok());
                if result.is_ok() {
                    debug!(attempt, "reload handler succeeded");
                }
                result
            })
            .await;

        let outcome = match result {
            Ok(()) => EventOutcome::Handled,
            Err(e) => {
                error!(
                    path = %event.path.display(),
                    attempts = self.retry.attempts.max(1),
                    error = %e,
                    "reload failed, dropping event"
                );
                EventOutcome::Dropped
            }
        };
        metrics::record_volume_event(outcome.as_str());
        outcome
    }

    /// Watch until `shutdown` fires. Events are handled one at a time.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> WatchResult<()> {
        if self.dirs.is_empty() {
            return Err(WatchError::NoDirectories);
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<notify::Error>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            },
            Config::default(),
        )?;

        for dir in &self.dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Watch {
                    path: dir.clone(),
                    source,
                })?;
            info!(dir = %dir.display(), "watching volume");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("volume watcher stopping");
                    break;
                }
                Some(event) = event_rx.recv() => {
                    for volume_event in VolumeEvent::from_notify(&event) {
                        self.process_event(&volume_event).await;
                    }
                }
                Some(e) = error_rx.recv() => {
                    warn!(error = %e, "filesystem watch error");
                }
                else => break,
            }
        }
        Ok(())
    }
}
