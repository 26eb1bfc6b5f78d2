//! Directory watcher that notifies subscribers about fully written files.
//!
//! # Architecture
//!
//! ```text
//! DirectoryWatcher<T>
//!   - notify::RecommendedWatcher (non-recursive, one directory)
//!   - crossbeam channel -> watch loop on the caller's thread
//!   - transform(path) -> Option<T>
//!   - CompletionCheck (exclusive lock by default)
//!   - notified set (at most one notification per path)
//!         |
//!   SubscriberRegistry<T>
//!         |
//!    +---------+---------+
//!    |         |         |
//! listener  listener  listener
//! ```

mod completion;
mod directory;
mod error;
mod event;
mod listener;
mod registry;
mod trigger;

pub use completion::{
    AlwaysComplete, Completion, CompletionCheck, CompletionStrategy, ExclusiveLockCheck,
};
pub use directory::{DirectoryWatcher, DirectoryWatcherBuilder, identity};
pub use error::NotifierError;
pub use event::{ChangedEvent, WatchSource};
pub use listener::DirectoryChangedListener;
pub use registry::{FanOutReport, SubscriberFailure, SubscriberHandle, SubscriberRegistry};
pub use trigger::ChangeKind;
