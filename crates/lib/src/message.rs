//! Chat messages and normalization of webhook-supplied message objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timestamp::{normalize_timestamp, now_ms};

/// Typographic quote characters replaced with a straight double quote in message text.
const SMART_QUOTES: &[char] = &[
    '\u{201C}', // left double
    '\u{201D}', // right double
    '\u{201E}', // low double
    '\u{201F}', // reversed double
    '\u{2033}', // double prime
    '\u{00AB}', // left guillemet
    '\u{00BB}', // right guillemet
];

/// Who authored a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// Webhook replies are agent-authored unless explicitly marked otherwise.
    #[default]
    Agent,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }
}

/// One entry in a conversation. `id` is unique within a session's message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            text: text.into(),
            sender,
            timestamp: now_ms(),
            thread_id: None,
        }
    }

    /// A user-authored message with a fresh id and the current time.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// An agent-authored message with a fresh id and the current time.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Sender::Agent, text)
    }
}

/// Fresh random message id.
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Replace smart/curly double quotes with `"`.
pub fn repair_quotes(text: &str) -> String {
    text.replace(SMART_QUOTES, "\"")
}

/// Map an arbitrary decoded object into a [`Message`]. Never fails.
///
/// Missing ids are generated, text has smart quotes repaired, unknown senders become
/// `agent`, and the timestamp is coerced through [`normalize_timestamp`].
pub fn normalize_message(raw: &Value) -> Message {
    let id = scalar_text(raw.get("id"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(new_message_id);
    let text = scalar_text(raw.get("text"))
        .map(|t| repair_quotes(&t))
        .unwrap_or_default();
    let sender = match raw.get("sender").and_then(Value::as_str) {
        Some("user") => Sender::User,
        _ => Sender::Agent,
    };
    let thread_id = scalar_text(raw.get("thread_id")).filter(|s| !s.is_empty());
    Message {
        id,
        text,
        sender,
        timestamp: normalize_timestamp(raw.get("timestamp")),
        thread_id,
    }
}

/// Strings as-is, numbers and booleans rendered; null, arrays and objects are absent.
fn scalar_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_supplied_fields() {
        let raw = json!({
            "id": "m-1",
            "text": "hello",
            "sender": "user",
            "timestamp": 1620000000000_i64,
            "thread_id": "t-9"
        });
        let msg = normalize_message(&raw);
        assert_eq!(msg.id, "m-1");
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.sender, Sender::User);
        assert_eq!(msg.timestamp, 1_620_000_000_000);
        assert_eq!(msg.thread_id.as_deref(), Some("t-9"));
    }

    #[test]
    fn fills_missing_fields() {
        let a = normalize_message(&json!({}));
        let b = normalize_message(&json!({ "id": "" }));
        assert!(!a.id.is_empty());
        assert!(!b.id.is_empty());
        assert_ne!(a.id, b.id);
        assert_eq!(a.text, "");
        assert_eq!(a.sender, Sender::Agent);
        assert!(a.thread_id.is_none());
    }

    #[test]
    fn unknown_sender_defaults_to_agent() {
        for sender in [json!("bot"), json!("USER"), json!(1), json!(null)] {
            let msg = normalize_message(&json!({ "text": "x", "sender": sender }));
            assert_eq!(msg.sender, Sender::Agent);
        }
    }

    #[test]
    fn smart_quotes_are_straightened() {
        let msg = normalize_message(&json!({ "text": "she said \u{201C}hi\u{201D}" }));
        assert_eq!(msg.text, "she said \"hi\"");
    }

    #[test]
    fn numeric_id_is_rendered() {
        let msg = normalize_message(&json!({ "id": 17, "text": "x" }));
        assert_eq!(msg.id, "17");
    }

    #[test]
    fn serializes_without_absent_thread_id() {
        let msg = Message::user("hi");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["sender"], "user");
        assert!(v.get("thread_id").is_none());
    }
}
