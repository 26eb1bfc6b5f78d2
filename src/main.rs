//! dropwatch binary: thin CLI over the library watcher.

use clap::Parser;

use dropwatch::Settings;
use dropwatch::cli::commands::watch::WatchOverrides;
use dropwatch::cli::{Cli, Commands, commands};

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli)?;
    dropwatch::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            commands::init::run_init(force)?;
        }
        Commands::Config => commands::init::run_config(&settings)?,
        Commands::Watch {
            directory,
            json,
            recheck_ms,
            modified,
            no_lock_check,
        } => {
            let overrides = WatchOverrides {
                recheck_ms,
                modified,
                no_lock_check,
            };
            commands::watch::run_watch(&settings, &directory, json, &overrides)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
