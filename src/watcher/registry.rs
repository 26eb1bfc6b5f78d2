//! Thread-safe subscriber list with fan-out.
//!
//! Writers (add/remove) take the exclusive lock. Fan-out takes the shared
//! lock only to snapshot the handles, then calls subscribers with no lock
//! held, so a callback may add or remove subscribers without deadlocking.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use super::event::ChangedEvent;
use super::listener::DirectoryChangedListener;

/// Shared handle to a registered subscriber. Removal compares by pointer.
pub type SubscriberHandle<T> = Arc<dyn DirectoryChangedListener<T>>;

/// A subscriber that failed during fan-out.
#[derive(Debug, Clone)]
pub struct SubscriberFailure {
    /// Position of the subscriber in the fan-out snapshot.
    pub index: usize,
    pub reason: String,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failures: Vec<SubscriberFailure>,
}

impl FanOutReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered group of subscribers receiving the same events.
pub struct SubscriberRegistry<T> {
    subscribers: RwLock<Vec<SubscriberHandle<T>>>,
}

impl<T> SubscriberRegistry<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Append a subscriber. The same handle may be added more than once.
    pub fn add(&self, handle: SubscriberHandle<T>) {
        self.subscribers.write().push(handle);
    }

    /// Remove the first subscriber identical to `handle`.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&self, handle: &SubscriberHandle<T>) -> bool {
        let mut subscribers = self.subscribers.write();
        match subscribers.iter().position(|s| Arc::ptr_eq(s, handle)) {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Deliver `event` to every subscriber registered when the call starts.
    pub fn fan_out(&self, event: &ChangedEvent<T>) -> FanOutReport {
        let snapshot: Vec<SubscriberHandle<T>> = self.subscribers.read().clone();
        let mut report = FanOutReport::default();

        for (index, subscriber) in snapshot.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                subscriber.on_directory_changed(event)
            }));

            let reason = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => panic_message(panic.as_ref()),
            };

            tracing::warn!("[registry] subscriber {index} failed: {reason}");
            report.failures.push(SubscriberFailure { index, reason });
        }

        crate::debug_event!(
            "registry",
            "fan-out",
            "{} delivered, {} failed",
            report.delivered,
            report.failures.len()
        );
        report
    }
}

impl<T> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
