//! Notification delivered to subscribers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the watcher that produced an event.
///
/// Each `DirectoryWatcher` owns exactly one source. The directory is set
/// when `observe` starts and stays at its last value after the loop ends.
#[derive(Debug)]
pub struct WatchSource {
    id: u64,
    directory: RwLock<Option<PathBuf>>,
}

impl WatchSource {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            directory: RwLock::new(None),
        }
    }

    /// Unique id of the watcher within this process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Directory being observed, if `observe` has started.
    pub fn directory(&self) -> Option<PathBuf> {
        self.directory.read().clone()
    }

    pub(crate) fn set_directory(&self, dir: &Path) {
        *self.directory.write() = Some(dir.to_path_buf());
    }
}

/// A completed file, transformed into the caller's payload type.
#[derive(Debug, Clone)]
pub struct ChangedEvent<T> {
    source: Arc<WatchSource>,
    payload: T,
}

impl<T> ChangedEvent<T> {
    pub fn new(source: Arc<WatchSource>, payload: T) -> Self {
        Self { source, payload }
    }

    /// The watcher that fired this event.
    pub fn source(&self) -> &WatchSource {
        &self.source
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}
