//! Volume watcher.
//!
//! # Data Flow
//! ```text
//! notify callback ──► events channel ─┐
//!                 └─► errors channel ─┼─► select! loop
//! shutdown broadcast ─────────────────┘        │
//!                                              ▼
//!                              FilterChain (default: `..data` swap only)
//!                                              │
//!                                              ▼
//!                              ConfigHandler::volume_handle
//!                              (FixedRetry, then drop)
//! ```
//!
//! # Design Decisions
//! - One event at a time; a slow handler delays the next event
//! - A dropped event is not requeued. The next real change retriggers
//! - Shutdown is observed between events, never mid-handler

pub mod event;
pub mod filter;
pub mod volume;

pub use event::{VolumeEvent, VolumeEventKind};
pub use filter::{AtomicSwapFilter, EventFilter, FilterChain, ATOMIC_SWAP_ENTRY};
pub use volume::{EventOutcome, VolumeWatcher};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no volume directories to watch")]
    NoDirectories,

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
}

pub type WatchResult<T> = Result<T, WatchError>;
