//! Mapping from native change events to the kinds that trigger a check.

use notify::EventKind;
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// Change kinds that cause a path to be considered for notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A new entry appeared (created, or renamed into the directory).
    Created,
    /// File contents or metadata changed.
    Modified,
    /// A writer closed its handle (inotify `IN_CLOSE_WRITE`).
    WriteClosed,
}

impl ChangeKind {
    /// Default trigger set: new entries, plus writers closing their handle
    /// so that files still locked at creation get a second chance.
    pub fn defaults() -> Vec<ChangeKind> {
        vec![ChangeKind::Created, ChangeKind::WriteClosed]
    }

    /// Classify a native event kind. `None` for kinds that never trigger.
    pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => None,
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                Some(ChangeKind::WriteClosed)
            }
            _ => None,
        }
    }
}
