//! Subscriber contract for directory notifications.

use super::event::ChangedEvent;

/// Receives one call per completed file.
///
/// Returning an error (or panicking) only affects this subscriber; the
/// remaining subscribers still receive the event and the watch loop keeps
/// running.
pub trait DirectoryChangedListener<T>: Send + Sync {
    fn on_directory_changed(&self, event: &ChangedEvent<T>) -> anyhow::Result<()>;
}

impl<T, F> DirectoryChangedListener<T> for F
where
    F: Fn(&ChangedEvent<T>) -> anyhow::Result<()> + Send + Sync,
{
    fn on_directory_changed(&self, event: &ChangedEvent<T>) -> anyhow::Result<()> {
        self(event)
    }
}
