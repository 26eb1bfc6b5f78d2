//! Watch a directory for dropped files and notify subscribers exactly once
//! per file, after the writer has finished with it.

pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatchConfig};
pub use watcher::{
    ChangeKind, ChangedEvent, Completion, CompletionCheck, DirectoryChangedListener,
    DirectoryWatcher, NotifierError, SubscriberHandle, SubscriberRegistry, WatchSource,
};
