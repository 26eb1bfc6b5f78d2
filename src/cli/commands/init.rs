//! Init and Config commands.

use std::path::PathBuf;

use anyhow::{Context, bail};

use crate::config::{CONFIG_DIR, Settings};

/// Run init command - create configuration file.
pub fn run_init(force: bool) -> anyhow::Result<PathBuf> {
    let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Settings::default()
        .save(&config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("Created configuration file at: {}", config_path.display());
    println!("Edit this file to customize your settings.");
    Ok(config_path)
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", config.to_toml()?);
    Ok(())
}
