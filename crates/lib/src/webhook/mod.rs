//! Webhook plumbing: wire types, the tolerant response parser, and the HTTP transport.
//!
//! The webhook is operator-supplied and its output format is not under our control,
//! so response bodies are read as text and recovered by [`parse_webhook_response`].

mod client;
mod parse;
mod protocol;

pub use client::{HttpReply, WebhookClient, WebhookError, WebhookTransport};
pub use parse::{
    parse_webhook_response, parse_with_strategy, ParseError, ParseStrategy, UNREADABLE_RESPONSE_TEXT,
};
pub use protocol::{ResponseStatus, WebhookRequest, WebhookResponse};
