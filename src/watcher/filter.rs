//! Ordered event filters.

use crate::watcher::{VolumeEvent, VolumeEventKind};

/// Entry the orchestrator renames into place on every volume update.
pub const ATOMIC_SWAP_ENTRY: &str = "..data";

pub trait EventFilter: Send + Sync {
    fn accept(&self, event: &VolumeEvent) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&VolumeEvent) -> bool + Send + Sync,
{
    fn accept(&self, event: &VolumeEvent) -> bool {
        self(event)
    }
}

/// Accepts only the `..data` swap, ignoring writes to individual files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicSwapFilter;

impl EventFilter for AtomicSwapFilter {
    fn accept(&self, event: &VolumeEvent) -> bool {
        matches!(event.kind, VolumeEventKind::Create | VolumeEventKind::Rename)
            && event.file_name() == Some(ATOMIC_SWAP_ENTRY)
    }
}

/// Filters applied in insertion order; an event must pass all of them.
pub struct FilterChain {
    filters: Vec<Box<dyn EventFilter>>,
}

impl FilterChain {
    /// A chain that accepts everything.
    pub fn empty() -> Self {
        Self { filters: Vec::new() }
    }

    pub fn with(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn accept(&self, event: &VolumeEvent) -> bool {
        self.filters.iter().all(|f| f.accept(event))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::empty().with(AtomicSwapFilter)
    }
}
