//! Filesystem events as seen by the reload handlers.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;

/// Kind of change, reduced from `notify`'s event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeEventKind {
    Create,
    Rename,
    Write,
    Remove,
    Other,
}

impl VolumeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeEventKind::Create => "create",
            VolumeEventKind::Rename => "rename",
            VolumeEventKind::Write => "write",
            VolumeEventKind::Remove => "remove",
            VolumeEventKind::Other => "other",
        }
    }
}

impl From<&EventKind> for VolumeEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => VolumeEventKind::Create,
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any)) => {
                VolumeEventKind::Rename
            }
            EventKind::Modify(ModifyKind::Name(_)) => VolumeEventKind::Other,
            EventKind::Modify(_) => VolumeEventKind::Write,
            EventKind::Remove(_) => VolumeEventKind::Remove,
            _ => VolumeEventKind::Other,
        }
    }
}

/// One change under a watched volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEvent {
    pub path: PathBuf,
    pub kind: VolumeEventKind,
}

impl VolumeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: VolumeEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Convert a `notify` event, one `VolumeEvent` per path.
    pub fn from_notify(event: &notify::Event) -> Vec<Self> {
        let kind = VolumeEventKind::from(&event.kind);
        let paths = match (&event.kind, event.paths.as_slice()) {
            // both-sided renames list [from, to]; the destination matters
            (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), [_, to]) => vec![to.clone()],
            _ => event.paths.clone(),
        };
        paths.into_iter().map(|p| Self::new(p, kind)).collect()
    }

    /// Directory the changed entry lives in.
    pub fn volume_dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}
