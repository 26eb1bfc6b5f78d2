//! Write-completion detection.
//!
//! A file that just appeared may still be mid-copy. The default check
//! treats a file as complete once an exclusive advisory lock can be taken
//! on it without blocking. This is a heuristic: writers that never lock
//! are indistinguishable from finished files, and filesystems without
//! advisory locks degrade to "always complete".

use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Result of a completion check.
#[derive(Debug)]
pub enum Completion {
    /// Nobody is writing the file anymore.
    Complete,
    /// Another writer still holds the file.
    InProgress,
    /// The file could not be opened or locked (busy, removed, not a file).
    Unavailable(io::Error),
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completion::Complete)
    }
}

/// Decides whether a file has finished being written.
pub trait CompletionCheck: Send + Sync {
    fn check(&self, path: &Path) -> Completion;
}

impl<F> CompletionCheck for F
where
    F: Fn(&Path) -> Completion + Send + Sync,
{
    fn check(&self, path: &Path) -> Completion {
        self(path)
    }
}

/// Opens the file and tries a non-blocking exclusive lock.
///
/// On Windows the file is opened for writing so that a writer's sharing
/// mode also reports the file as busy. Elsewhere it is opened read-only:
/// `flock` does not need write access, and closing a writable handle would
/// emit the very `WriteClosed` event the watcher listens for. As a
/// consequence, read-only files are reported as complete on Unix, while
/// Windows reports them `Unavailable` because they cannot be opened for
/// writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveLockCheck;

impl ExclusiveLockCheck {
    fn open(path: &Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        if cfg!(windows) {
            options.write(true);
        } else {
            options.read(true);
        }
        let file = options.open(path)?;

        if file.metadata()?.is_dir() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
        }
        Ok(file)
    }
}

impl CompletionCheck for ExclusiveLockCheck {
    fn check(&self, path: &Path) -> Completion {
        let file = match Self::open(path) {
            Ok(file) => file,
            Err(e) => return Completion::Unavailable(e),
        };

        match file.try_lock() {
            Ok(()) => {
                release(&file, path);
                Completion::Complete
            }
            Err(TryLockError::WouldBlock) => Completion::InProgress,
            Err(TryLockError::Error(e)) => Completion::Unavailable(e),
        }
    }
}

fn release(file: &File, path: &Path) {
    // Closing the handle drops the lock as well; an unlock failure is harmless.
    if let Err(e) = file.unlock() {
        crate::debug_event!("completion", "unlock failed", "{}: {e}", path.display());
    }
}

/// Treats every file as complete. For platforms without advisory locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysComplete;

impl CompletionCheck for AlwaysComplete {
    fn check(&self, _path: &Path) -> Completion {
        Completion::Complete
    }
}

/// Completion strategy selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStrategy {
    #[default]
    ExclusiveLock,
    Always,
}

impl CompletionStrategy {
    pub fn build(self) -> Box<dyn CompletionCheck> {
        match self {
            CompletionStrategy::ExclusiveLock => Box::new(ExclusiveLockCheck),
            CompletionStrategy::Always => Box::new(AlwaysComplete),
        }
    }
}
