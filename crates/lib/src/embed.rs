//! Embedding: cross-frame messages exchanged with the hosting page, and the iframe
//! snippet an admin pastes into a site.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::session::ConversationSession;
use crate::widget::WidgetSettings;

/// A message posted between the widget frame and the hosting page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrameMessage {
    /// Widget to host: the chat finished loading.
    #[serde(rename = "CHAT_READY")]
    ChatReady {
        #[serde(rename = "instanceId")]
        instance_id: String,
    },
    #[serde(rename = "IFRAME_REQUEST_FULLSCREEN")]
    RequestFullscreen,
    #[serde(rename = "IFRAME_EXIT_FULLSCREEN")]
    ExitFullscreen,
    /// Host to widget: replace the webhook URL of one instance.
    #[serde(rename = "SET_WEBHOOK_URL")]
    SetWebhookUrl {
        #[serde(rename = "instanceId")]
        instance_id: String,
        #[serde(rename = "webhookUrl")]
        webhook_url: String,
    },
}

impl FrameMessage {
    /// Decode a posted message; anything that is not one of ours yields `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// The widget side of the cross-frame channel for one instance.
#[derive(Debug)]
pub struct FrameBridge {
    instance_id: String,
    fullscreen: AtomicBool,
}

impl FrameBridge {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            fullscreen: AtomicBool::new(false),
        }
    }

    /// Bridge keyed by the session's instance key, or a generated `chat_<id>` when the
    /// page supplied none.
    pub fn for_session(session: &ConversationSession) -> Self {
        let id = session.instance_key().map(str::to_string).unwrap_or_else(|| {
            let simple = uuid::Uuid::new_v4().simple().to_string();
            format!("chat_{}", &simple[..13])
        });
        Self::new(id)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::SeqCst)
    }

    pub fn ready(&self) -> FrameMessage {
        FrameMessage::ChatReady {
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn request_fullscreen(&self) -> FrameMessage {
        self.fullscreen.store(true, Ordering::SeqCst);
        FrameMessage::RequestFullscreen
    }

    pub fn exit_fullscreen(&self) -> FrameMessage {
        self.fullscreen.store(false, Ordering::SeqCst);
        FrameMessage::ExitFullscreen
    }

    /// Apply a message from the hosting page. Returns true when it was addressed to
    /// this instance and changed something.
    pub fn receive(&self, message: &FrameMessage, session: &ConversationSession) -> bool {
        match message {
            FrameMessage::SetWebhookUrl {
                instance_id,
                webhook_url,
            } => {
                if instance_id != &self.instance_id {
                    log::debug!("ignoring webhook url for instance {}", instance_id);
                    return false;
                }
                session.set_webhook_url(webhook_url.as_str());
                true
            }
            FrameMessage::RequestFullscreen => !self.fullscreen.swap(true, Ordering::SeqCst),
            FrameMessage::ExitFullscreen => self.fullscreen.swap(false, Ordering::SeqCst),
            FrameMessage::ChatReady { .. } => false,
        }
    }
}

/// `<base>/embed/chat?id=<id>` for a widget.
pub fn iframe_embed_url(base_url: &str, widget: &WidgetSettings) -> Result<Url> {
    let base = base_url.trim().trim_end_matches('/');
    let mut url = Url::parse(&format!("{}/embed/chat", base))
        .with_context(|| format!("parsing base url {}", base_url))?;
    url.query_pairs_mut().append_pair("id", &widget.id);
    Ok(url)
}

fn attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// The iframe snippet for a widget, sized by its width and height.
pub fn iframe_embed_code(base_url: &str, widget: &WidgetSettings) -> Result<String> {
    let src = iframe_embed_url(base_url, widget)?;
    Ok(format!(
        r#"<iframe
  src="{}"
  width="{}"
  height="{}"
  frameborder="0"
  allow="clipboard-write"
  style="border-radius: 8px; box-shadow: 0 4px 12px rgba(0, 0, 0, 0.1);"
></iframe>"#,
        attr(src.as_str()),
        attr(&widget.width),
        attr(&widget.height)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;
    use crate::session::SessionOptions;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn session(own: &str) -> ConversationSession {
        let page = StaticPage::parse(own).unwrap();
        ConversationSession::new(SessionOptions::new(
            Arc::new(page),
            Arc::new(MemoryStore::new()),
        ))
    }

    #[test]
    fn wire_shape() {
        let ready = FrameBridge::new("w1").ready();
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            json!({"type": "CHAT_READY", "instanceId": "w1"})
        );
        assert_eq!(
            serde_json::to_value(FrameMessage::RequestFullscreen).unwrap(),
            json!({"type": "IFRAME_REQUEST_FULLSCREEN"})
        );
        let set = FrameMessage::from_value(&json!({
            "type": "SET_WEBHOOK_URL",
            "instanceId": "w1",
            "webhookUrl": "https://hook.example/a"
        }));
        assert_eq!(
            set,
            Some(FrameMessage::SetWebhookUrl {
                instance_id: "w1".into(),
                webhook_url: "https://hook.example/a".into(),
            })
        );
        assert_eq!(FrameMessage::from_value(&json!({"type": "OTHER"})), None);
    }

    #[test]
    fn webhook_url_applies_only_to_matching_instance() {
        let session = session("https://widgets.example/embed/chat?id=w1");
        let bridge = FrameBridge::for_session(&session);
        assert_eq!(bridge.instance_id(), "w1");

        let other = FrameMessage::SetWebhookUrl {
            instance_id: "w2".into(),
            webhook_url: "https://hook.example/other".into(),
        };
        assert!(!bridge.receive(&other, &session));
        assert_eq!(session.webhook_url(), None);

        let mine = FrameMessage::SetWebhookUrl {
            instance_id: "w1".into(),
            webhook_url: "https://hook.example/mine".into(),
        };
        assert!(bridge.receive(&mine, &session));
        assert_eq!(
            session.webhook_url().as_deref(),
            Some("https://hook.example/mine")
        );
    }

    #[test]
    fn fullscreen_flag_follows_both_directions() {
        let session = session("https://widgets.example/embed/chat");
        let bridge = FrameBridge::for_session(&session);
        assert!(bridge.instance_id().starts_with("chat_"));

        assert_eq!(bridge.request_fullscreen(), FrameMessage::RequestFullscreen);
        assert!(bridge.is_fullscreen());
        assert!(bridge.receive(&FrameMessage::ExitFullscreen, &session));
        assert!(!bridge.is_fullscreen());
        assert!(!bridge.receive(&FrameMessage::ExitFullscreen, &session));
    }

    #[test]
    fn embed_code_uses_widget_size() {
        let mut widget = WidgetSettings::new("sales team");
        widget.height = "640px".into();
        let url = iframe_embed_url("https://chat.example/", &widget).unwrap();
        assert_eq!(url.as_str(), "https://chat.example/embed/chat?id=sales+team");

        let code = iframe_embed_code("https://chat.example", &widget).unwrap();
        assert!(code.contains(r#"src="https://chat.example/embed/chat?id=sales+team""#));
        assert!(code.contains(r#"width="100%""#));
        assert!(code.contains(r#"height="640px""#));
        assert!(code.starts_with("<iframe") && code.ends_with("</iframe>"));
    }
}
