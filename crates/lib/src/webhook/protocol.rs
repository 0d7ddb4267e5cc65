//! Webhook wire types.
//!
//! Outbound: `{ "message", "messages", "thread_id"?, "chat_title"?, "page_url"?,
//! "user_id"?, "module_id"? }`.
//! Inbound (nominal): `{ "status": "success"|"error", "messages"?: [...], "error"? }`,
//! though real bodies deviate; [`WebhookResponse::from_value`] coerces whatever decoded.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::message::Message;

/// POST body sent to the webhook for one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub message: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Success,
    Error,
}

/// Structured webhook response. `messages` holds raw message-like objects; they are
/// turned into [`Message`]s by [`crate::message::normalize_message`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookResponse {
    pub status: ResponseStatus,
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Top-level `thread_id`, when the webhook puts it beside the messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl WebhookResponse {
    /// Successful response carrying the given raw messages.
    pub fn success(messages: Vec<Value>) -> Self {
        Self {
            status: ResponseStatus::Success,
            messages,
            error: None,
            thread_id: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// Coerce any decoded JSON value into a response.
    ///
    /// - object: `status`/`error`/`thread_id` are read; messages come from a `messages`
    ///   array (or a lone object or string there). When that yields nothing, a singular
    ///   `message` field is used, and failing that the object itself if it carries `text`.
    /// - array: its items are the messages.
    /// - string: a single message with that text.
    /// - anything else: no messages.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(obj) => Self::from_object(obj),
            Value::Array(items) => Self::success(message_items(items)),
            Value::String(text) => Self::success(vec![json!({ "text": text })]),
            _ => Self::success(Vec::new()),
        }
    }

    fn from_object(mut obj: Map<String, Value>) -> Self {
        let status = match obj.get("status").and_then(Value::as_str) {
            Some(s) if s.trim().eq_ignore_ascii_case("error") => ResponseStatus::Error,
            _ => ResponseStatus::Success,
        };
        let error = obj
            .get("error")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let thread_id = obj
            .get("thread_id")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let mut messages = match obj.remove("messages") {
            Some(Value::Array(items)) => message_items(items),
            Some(item @ (Value::Object(_) | Value::String(_))) => message_items(vec![item]),
            _ => Vec::new(),
        };
        if messages.is_empty() {
            messages = match obj.remove("message") {
                Some(item @ (Value::Object(_) | Value::String(_))) => message_items(vec![item]),
                _ => Vec::new(),
            };
        }
        if messages.is_empty() && obj.get("text").is_some_and(|t| !t.is_null()) {
            messages.push(Value::Object(obj));
        }

        Self {
            status,
            messages,
            error,
            thread_id,
        }
    }
}

/// Objects are kept, bare strings become `{ "text": .. }`, other items are dropped.
fn message_items(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => Some(item),
            Value::String(text) => Some(json!({ "text": text })),
            _ => None,
        })
        .collect()
}
