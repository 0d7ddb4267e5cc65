//! Initialize the configuration directory: create ~/.embedchat, a default config with an
//! example widget, and the conversation store directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::widget::WidgetSettings;

/// Id of the widget seeded by [`init_config_dir`].
pub const EXAMPLE_WIDGET_ID: &str = "example";

/// Ensure the configuration directory has been initialized (config file exists).
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `embedchat init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

fn default_config() -> Config {
    let mut widget = WidgetSettings::new(EXAMPLE_WIDGET_ID);
    widget.name = "Example widget".to_string();
    Config {
        widgets: vec![widget],
        ..Config::default()
    }
}

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with one example widget if missing.
/// - Creates the store directory resolved from the (possibly existing) config.
///
/// Returns the store directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let json = serde_json::to_string_pretty(&default_config())
            .context("encoding default config")?;
        std::fs::write(config_path, json)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let store_dir = config::resolve_store_dir(&config, config_path);
    if !store_dir.exists() {
        std::fs::create_dir_all(&store_dir)
            .with_context(|| format!("creating store directory {}", store_dir.display()))?;
        log::info!("created store directory at {}", store_dir.display());
    }
    Ok(store_dir)
}
