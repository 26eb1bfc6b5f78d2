//! Directory watcher: waits for dropped files to finish and notifies once.

use std::collections::{HashMap, HashSet};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, at, bounded, never, select};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::config::WatchConfig;

use super::completion::{Completion, CompletionCheck};
use super::error::NotifierError;
use super::event::{ChangedEvent, WatchSource};
use super::registry::{SubscriberHandle, SubscriberRegistry};
use super::trigger::ChangeKind;

/// Identity transform: the payload is the full path of the completed file.
pub fn identity(path: &Path) -> Option<PathBuf> {
    Some(path.to_path_buf())
}

/// Watches one directory and fans out a notification for every file that
/// appears in it, once that file is no longer being written.
///
/// `observe_with` blocks the calling thread until [`close`](Self::close) is
/// called, the directory disappears, or the native watcher shuts down. Share
/// the watcher through an `Arc` to close it or manage subscribers from other
/// threads.
pub struct DirectoryWatcher<T> {
    source: Arc<WatchSource>,
    registry: SubscriberRegistry<T>,
    completion: Box<dyn CompletionCheck>,
    config: WatchConfig,
    /// Dropped by `close`, which disconnects `close_rx` and wakes the loop.
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    observing: AtomicBool,
}

/// Per-call loop state. Only the loop thread touches it.
struct LoopState<T> {
    directory: PathBuf,
    notified: HashSet<PathBuf>,
    pending: HashMap<PathBuf, T>,
    /// Deadline of the next recheck. Armed when the first path is deferred,
    /// so events arriving in between do not push it back.
    next_recheck: Option<Instant>,
}

enum Flow {
    Continue,
    Stop,
}

impl<T> DirectoryWatcher<T> {
    /// Watcher with default configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DirectoryWatcherBuilder<T> {
        DirectoryWatcherBuilder::new()
    }

    /// Identity of this watcher, as seen by subscribers.
    pub fn source(&self) -> &Arc<WatchSource> {
        &self.source
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn add_subscriber(&self, handle: SubscriberHandle<T>) {
        self.registry.add(handle);
    }

    /// Returns `false` if the handle was not registered.
    pub fn remove_subscriber(&self, handle: &SubscriberHandle<T>) -> bool {
        self.registry.remove(handle)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_closed(&self) -> bool {
        self.close_tx.lock().is_none()
    }

    /// Stop the watch loop. A blocked `observe_with` returns `Ok(())`.
    ///
    /// Closing is permanent and idempotent; later calls do nothing.
    pub fn close(&self) {
        match self.close_tx.lock().take() {
            Some(tx) => {
                drop(tx);
                crate::log_event!("watcher", "closed", "source {}", self.source.id());
            }
            None => {
                crate::debug_event!("watcher", "already closed", "source {}", self.source.id());
            }
        }
    }

    /// Watch `directory` and notify subscribers with `transform(path)` for
    /// each completed file. `transform` returning `None` skips the file.
    ///
    /// Fails only on startup: invalid directory, concurrent observe, or a
    /// native watch that cannot be created. Every shutdown path returns
    /// `Ok(())`.
    pub fn observe_with<F>(
        &self,
        directory: impl AsRef<Path>,
        transform: F,
    ) -> Result<(), NotifierError>
    where
        F: Fn(&Path) -> Option<T>,
    {
        let directory = validate_directory(directory.as_ref())?;

        if self
            .observing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(NotifierError::AlreadyObserving);
        }
        let _guard = ObservingGuard(&self.observing);

        if self.is_closed() {
            crate::debug_event!("watcher", "closed before start", "{}", directory.display());
            return Ok(());
        }

        let (event_tx, event_rx) = bounded(self.config.channel_capacity.max(1));
        let mut native = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;
        native
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| NotifierError::SubscriptionFailed {
                path: directory.clone(),
                reason: e.to_string(),
            })?;

        self.source.set_directory(&directory);
        crate::log_event!("watcher", "watching", "{}", directory.display());

        let mut state = LoopState {
            directory,
            notified: HashSet::new(),
            pending: HashMap::new(),
            next_recheck: None,
        };

        loop {
            let recheck = match state.next_recheck {
                Some(deadline) => at(deadline),
                None => never(),
            };

            let flow = select! {
                recv(self.close_rx) -> _ => Flow::Stop,
                recv(event_rx) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_batch(event, &transform, &mut state),
                    Ok(Err(e)) => {
                        tracing::warn!("[watcher] file watch error: {e}");
                        Flow::Continue
                    }
                    Err(_) => {
                        crate::debug_event!("watcher", "native watcher disconnected");
                        Flow::Stop
                    }
                },
                recv(recheck) -> _ => {
                    self.recheck_pending(&mut state);
                    Flow::Continue
                }
            };

            if let Flow::Stop = flow {
                break;
            }
        }

        crate::log_event!(
            "watcher",
            "stopped",
            "{} ({} notified)",
            state.directory.display(),
            state.notified.len()
        );
        Ok(())
    }

    /// Process one native event, then check the subscription is still valid.
    fn handle_batch<F>(&self, event: Event, transform: &F, state: &mut LoopState<T>) -> Flow
    where
        F: Fn(&Path) -> Option<T>,
    {
        if event.need_rescan() {
            // Overflow: the OS dropped events. Nothing to resolve.
            crate::debug_event!("watcher", "overflow", "{}", state.directory.display());
        } else if let Some(kind) = ChangeKind::classify(&event.kind) {
            if self.config.triggers_on(kind) {
                for path in &event.paths {
                    self.consider(path, transform, state);
                }
            }
        }

        if self.subscription_valid(&event, &state.directory) {
            Flow::Continue
        } else {
            crate::log_event!("watcher", "directory gone", "{}", state.directory.display());
            Flow::Stop
        }
    }

    fn subscription_valid(&self, event: &Event, directory: &Path) -> bool {
        let removed_self = matches!(event.kind, EventKind::Remove(_))
            && event.paths.iter().any(|p| p == directory);
        !removed_self && directory.is_dir()
    }

    fn consider<F>(&self, path: &Path, transform: &F, state: &mut LoopState<T>)
    where
        F: Fn(&Path) -> Option<T>,
    {
        let full_path = state.directory.join(path);
        if full_path.parent() != Some(state.directory.as_path()) {
            crate::debug_event!("watcher", "outside directory", "{}", full_path.display());
            return;
        }

        if state.notified.contains(&full_path) {
            crate::debug_event!("watcher", "already notified", "{}", full_path.display());
            return;
        }

        let Some(payload) = transform(&full_path) else {
            crate::debug_event!("watcher", "skipped by transform", "{}", full_path.display());
            state.pending.remove(&full_path);
            return;
        };

        self.complete_or_defer(full_path, payload, state);
    }

    fn complete_or_defer(&self, path: PathBuf, payload: T, state: &mut LoopState<T>) {
        match self.completion.check(&path) {
            Completion::Complete => self.fire(path, payload, state),
            Completion::InProgress => {
                crate::debug_event!("watcher", "still writing", "{}", path.display());
                self.defer(path, payload, state);
            }
            Completion::Unavailable(e) => {
                crate::debug_event!("watcher", "not ready", "{}: {e}", path.display());
                if is_permanent(&e) {
                    state.pending.remove(&path);
                } else {
                    self.defer(path, payload, state);
                }
            }
        }
    }

    fn defer(&self, path: PathBuf, payload: T, state: &mut LoopState<T>) {
        let Some(interval) = self.config.recheck_interval() else {
            return;
        };
        state.pending.insert(path, payload);
        if state.next_recheck.is_none() {
            state.next_recheck = Some(Instant::now() + interval);
        }
    }

    /// Re-check every deferred path. Paths still not complete re-arm the
    /// deadline through `defer`.
    fn recheck_pending(&self, state: &mut LoopState<T>) {
        state.next_recheck = None;
        let pending = std::mem::take(&mut state.pending);
        crate::debug_event!("watcher", "recheck", "{} pending", pending.len());

        for (path, payload) in pending {
            if !path.is_file() {
                continue;
            }
            self.complete_or_defer(path, payload, state);
        }
    }

    fn fire(&self, path: PathBuf, payload: T, state: &mut LoopState<T>) {
        state.pending.remove(&path);
        if !state.notified.insert(path.clone()) {
            return;
        }

        crate::log_event!("watcher", "completed", "{}", path.display());
        let event = ChangedEvent::new(self.source.clone(), payload);
        let report = self.registry.fan_out(&event);
        if !report.is_clean() {
            tracing::warn!(
                "[watcher] {} of {} subscribers failed for {}",
                report.failures.len(),
                report.failures.len() + report.delivered,
                path.display()
            );
        }
    }
}

impl<T: Send + Sync + 'static> DirectoryWatcher<T> {
    /// Run [`observe_with`](Self::observe_with) on a dedicated thread.
    pub fn spawn<F>(
        self: &Arc<Self>,
        directory: impl Into<PathBuf>,
        transform: F,
    ) -> io::Result<JoinHandle<Result<(), NotifierError>>>
    where
        F: Fn(&Path) -> Option<T> + Send + 'static,
    {
        let watcher = Arc::clone(self);
        let directory = directory.into();
        std::thread::Builder::new()
            .name(format!("dropwatch-{}", self.source.id()))
            .spawn(move || watcher.observe_with(directory, transform))
    }
}

impl DirectoryWatcher<PathBuf> {
    /// Watch `directory` and deliver the full path of each completed file.
    pub fn observe(&self, directory: impl AsRef<Path>) -> Result<(), NotifierError> {
        self.observe_with(directory, identity)
    }
}

impl<T> Default for DirectoryWatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DirectoryWatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("source", &self.source)
            .field("config", &self.config)
            .field("subscribers", &self.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Clears the observing flag when the loop exits, however it exits.
struct ObservingGuard<'a>(&'a AtomicBool);

impl Drop for ObservingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Open failures that retrying will not fix.
fn is_permanent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput
    )
}

fn validate_directory(directory: &Path) -> Result<PathBuf, NotifierError> {
    let metadata =
        std::fs::metadata(directory).map_err(|source| NotifierError::InvalidDirectory {
            path: directory.to_path_buf(),
            source,
        })?;
    if !metadata.is_dir() {
        return Err(NotifierError::NotADirectory {
            path: directory.to_path_buf(),
        });
    }

    directory
        .canonicalize()
        .map_err(|source| NotifierError::InvalidDirectory {
            path: directory.to_path_buf(),
            source,
        })
}

/// Builder for constructing a DirectoryWatcher.
pub struct DirectoryWatcherBuilder<T> {
    config: WatchConfig,
    completion: Option<Box<dyn CompletionCheck>>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> DirectoryWatcherBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: WatchConfig::default(),
            completion: None,
            _payload: PhantomData,
        }
    }

    /// Use the given watch configuration.
    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the completion check selected by the configuration.
    pub fn completion_check(mut self, check: impl CompletionCheck + 'static) -> Self {
        self.completion = Some(Box::new(check));
        self
    }

    pub fn build(self) -> DirectoryWatcher<T> {
        let completion = self
            .completion
            .unwrap_or_else(|| self.config.completion.build());
        let (close_tx, close_rx) = bounded(0);

        DirectoryWatcher {
            source: Arc::new(WatchSource::new()),
            registry: SubscriberRegistry::new(),
            completion,
            config: self.config,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            observing: AtomicBool::new(false),
        }
    }
}

impl<T> Default for DirectoryWatcherBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
