//! Widget settings: one configured chat widget (what the admin panel edits).

use serde::{Deserialize, Serialize};

/// Where the floating launcher sits on the hosting page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidgetPosition {
    #[default]
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
}

/// A named chat widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSettings {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_chat_title")]
    pub chat_title: String,
    /// Webhook that receives chat turns. Falls back to `webhook.url` when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_input_placeholder")]
    pub input_placeholder: String,
    #[serde(default = "default_empty_state_text")]
    pub empty_state_text: String,
    /// CSS width of the embedded frame (default "100%").
    #[serde(default = "default_width")]
    pub width: String,
    /// CSS height of the embedded frame (default "500px").
    #[serde(default = "default_height")]
    pub height: String,
    /// Accent color, any CSS color value.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: WidgetPosition,
}

fn default_chat_title() -> String {
    "Support Chat".to_string()
}

fn default_input_placeholder() -> String {
    "Type a message...".to_string()
}

fn default_empty_state_text() -> String {
    "Send a message to start chatting".to_string()
}

fn default_width() -> String {
    "100%".to_string()
}

fn default_height() -> String {
    "500px".to_string()
}

impl WidgetSettings {
    /// Settings with defaults for everything but the id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            chat_title: default_chat_title(),
            webhook_url: None,
            input_placeholder: default_input_placeholder(),
            empty_state_text: default_empty_state_text(),
            width: default_width(),
            height: default_height(),
            color: None,
            position: WidgetPosition::default(),
        }
    }

    /// Display name, or the id when no name is set.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}
