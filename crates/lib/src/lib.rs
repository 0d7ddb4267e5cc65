//! Embedchat core library: widget sessions, the webhook exchange and its tolerant
//! response parser, durable conversation storage, and configuration, used by the CLI.

pub mod config;
pub mod dedupe;
pub mod embed;
pub mod init;
pub mod message;
pub mod notify;
pub mod page;
pub mod session;
pub mod store;
pub mod timestamp;
pub mod webhook;
pub mod widget;
