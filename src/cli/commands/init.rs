//! `init` and `config` commands.

use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::config::Settings;

/// Write default settings under `dir`. Refuses to overwrite unless `force`.
pub fn run_init(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let path = Settings::init_config_file(dir, force).map_err(|e| anyhow!("{e}"))?;
    println!("Created {}", path.display());
    println!("Adjust [observer], [download] and [logging] there, or override with PATHWATCH_* variables.");
    Ok(path)
}

/// Render the merged settings (defaults, file, environment) as TOML.
pub fn render_config(config: &Settings) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

/// Print the merged settings.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", render_config(config)?);
    Ok(())
}
