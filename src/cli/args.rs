//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Drop-folder watcher
#[derive(Parser, Debug)]
#[command(
    name = "dropwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Notify once per file dropped into a directory, after it is fully written",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .dropwatch/settings.toml with default values
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Watch a directory and print one line per completed file
    Watch {
        /// Directory to watch (not recursive)
        #[arg(value_name = "DIR")]
        directory: PathBuf,

        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,

        /// Re-check files still being written after this many milliseconds
        #[arg(long, value_name = "MS")]
        recheck_ms: Option<u64>,

        /// Also trigger on content modifications
        #[arg(long)]
        modified: bool,

        /// Skip the lock-based completion check
        #[arg(long)]
        no_lock_check: bool,
    },

    /// Display active settings
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_flags() {
        let cli = Cli::parse_from([
            "dropwatch",
            "--config",
            "custom.toml",
            "watch",
            "inbox",
            "--json",
            "--recheck-ms",
            "250",
            "--modified",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        match cli.command {
            Commands::Watch {
                directory,
                json,
                recheck_ms,
                modified,
                no_lock_check,
            } => {
                assert_eq!(directory, PathBuf::from("inbox"));
                assert!(json);
                assert_eq!(recheck_ms, Some(250));
                assert!(modified);
                assert!(!no_lock_check);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_watch_requires_directory() {
        assert!(Cli::try_parse_from(["dropwatch", "watch"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
