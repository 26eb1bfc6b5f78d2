//! Unified logging for debug output.
//!
//! Provides compact timestamped logging with per-module level configuration.
//! Supports `RUST_LOG` environment variable for runtime overrides.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"  # quiet by default
//!
//! [logging.modules]
//! "dropwatch::watcher" = "debug"
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug dropwatch watch ./inbox
//! RUST_LOG=dropwatch::watcher=trace dropwatch watch ./inbox
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from configuration.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    let mut filter_str = config.default.clone();
    for (module, level) in modules {
        filter_str.push_str(&format!(",{module}={level}"));
    }
    filter_str
}

/// Initialize logging with configuration.
///
/// Call once at startup. Safe to call multiple times (only first call takes effect).
/// Logs go to stderr so that notifications printed on stdout stay machine-readable.
///
/// The `RUST_LOG` environment variable takes precedence over config settings.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A host application may already own the global subscriber.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// Initialize logging with default configuration.
///
/// Uses `LoggingConfig::default()` which sets `default = "warn"` for quiet operation.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("watcher", "watching", "{}", dir.display());
/// log_event!("watcher", "closed");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("watcher", "skipped", "{}", path.display());
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        assert_eq!(filter_directives(&config), "warn");

        config.modules.insert("dropwatch::watcher".into(), "debug".into());
        config.modules.insert("dropwatch::cli".into(), "info".into());
        assert_eq!(
            filter_directives(&config),
            "warn,dropwatch::cli=info,dropwatch::watcher=debug"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_config(&LoggingConfig::default());
        crate::debug_event!("logging", "initialized twice");
    }
}
