//! Watch command: print one line per completed file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use crate::config::{Settings, WatchConfig};
use crate::watcher::{ChangeKind, ChangedEvent, CompletionStrategy, DirectoryWatcher};

/// Command-line overrides for the `[watch]` settings.
#[derive(Debug, Default, Clone)]
pub struct WatchOverrides {
    pub recheck_ms: Option<u64>,
    pub modified: bool,
    pub no_lock_check: bool,
}

impl WatchOverrides {
    /// Apply the overrides on top of file/env configuration.
    pub fn apply(&self, mut config: WatchConfig) -> WatchConfig {
        if let Some(ms) = self.recheck_ms {
            config.recheck_interval_ms = Some(ms);
        }
        if self.modified && !config.triggers_on(ChangeKind::Modified) {
            config.triggers.push(ChangeKind::Modified);
        }
        if self.no_lock_check {
            config.completion = CompletionStrategy::Always;
        }
        config
    }
}

/// One printed notification.
#[derive(Debug, Serialize)]
pub struct NotificationLine {
    pub source: u64,
    pub directory: Option<PathBuf>,
    pub path: PathBuf,
}

impl NotificationLine {
    pub fn from_event(event: &ChangedEvent<PathBuf>) -> Self {
        Self {
            source: event.source().id(),
            directory: event.source().directory(),
            path: event.payload().clone(),
        }
    }

    pub fn render(&self, json: bool) -> anyhow::Result<String> {
        if json {
            Ok(serde_json::to_string(self)?)
        } else {
            Ok(self.path.display().to_string())
        }
    }
}

/// Run watch command. Blocks until the directory disappears or the process
/// is terminated.
pub fn run_watch(
    settings: &Settings,
    directory: &Path,
    json: bool,
    overrides: &WatchOverrides,
) -> anyhow::Result<()> {
    let config = overrides.apply(settings.watch.clone());
    crate::debug_event!("cli", "watch config", "{config:?}");

    let watcher: DirectoryWatcher<PathBuf> = DirectoryWatcher::builder().config(config).build();
    watcher.add_subscriber(Arc::new(
        move |event: &ChangedEvent<PathBuf>| -> anyhow::Result<()> {
            let line = NotificationLine::from_event(event).render(json)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{line}")?;
            stdout.flush()?;
            Ok(())
        },
    ));

    watcher
        .observe(directory)
        .with_context(|| format!("watching {}", directory.display()))
}
