//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.embedchat/config.json`) and environment.
//! It holds the webhook defaults, where conversations are stored, and the widget list.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::widget::WidgetSettings;

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 600;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook defaults (timeout, fallback URL).
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Durable conversation storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Configured widgets.
    #[serde(default)]
    pub widgets: Vec<WidgetSettings>,
}

/// Webhook call settings shared by all widgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Ceiling on one webhook round trip, in seconds (default 60, clamped to 1..=600).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Webhook used by widgets that have none of their own. Overridden by EMBEDCHAT_WEBHOOK_URL env.
    #[serde(default)]
    pub url: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS))
    }
}

/// Where conversation state is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Store directory. Relative paths are resolved against the config file's parent.
    /// Omit to use the `store` subdirectory next to the config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Widget by id.
    pub fn widget(&self, id: &str) -> Option<&WidgetSettings> {
        self.widgets.iter().find(|w| w.id == id)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve the webhook URL for a widget: env EMBEDCHAT_WEBHOOK_URL overrides the
/// widget's own URL, which overrides `webhook.url`.
pub fn resolve_webhook_url(config: &Config, widget: Option<&WidgetSettings>) -> Option<String> {
    std::env::var("EMBEDCHAT_WEBHOOK_URL")
        .ok()
        .and_then(|s| non_empty(&s))
        .or_else(|| widget.and_then(|w| w.webhook_url.as_deref()).and_then(non_empty))
        .or_else(|| config.webhook.url.as_deref().and_then(non_empty))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("EMBEDCHAT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".embedchat").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the store directory: `storage.directory` if set (relative paths resolved
/// against the config file's parent), otherwise the `store` subdirectory.
pub fn resolve_store_dir(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.storage.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                parent.join(d)
            }
        }
        _ => parent.join("store"),
    }
}

/// Load config from the given path, or the default path (or EMBEDCHAT_CONFIG_PATH).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
