//! Conversation session for one widget instance.
//!
//! The session owns the message list and thread id, persists both on every change,
//! and runs one webhook round trip per user message: optimistic echo of the user
//! message, bounded wait for the webhook, tolerant parsing, normalization,
//! de-duplication, and thread-id adoption. Every failure is resolved here into a
//! synthetic agent message plus a notice; nothing propagates to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::dedupe::retain_new;
use crate::message::{normalize_message, Message};
use crate::notify::{LogNotifier, Notifier, SendFailure, FAILED_TURN_TEXT};
use crate::page::PageContext;
use crate::store::{ChatStorage, DurableStore};
use crate::webhook::{
    parse_with_strategy, WebhookClient, WebhookError, WebhookRequest, WebhookResponse,
    WebhookTransport, UNREADABLE_RESPONSE_TEXT,
};

/// Default ceiling on one webhook round trip.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest slice of an error body kept in a [`SendFailure::Status`].
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Everything a session needs from its host.
pub struct SessionOptions {
    pub webhook_url: Option<String>,
    pub chat_title: Option<String>,
    pub timeout: Duration,
    pub page: Arc<dyn PageContext>,
    pub store: Arc<dyn DurableStore>,
    pub transport: Arc<dyn WebhookTransport>,
    pub notifier: Arc<dyn Notifier>,
}

impl SessionOptions {
    /// Options with an HTTP transport, log notifier and the default timeout.
    pub fn new(page: Arc<dyn PageContext>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            webhook_url: None,
            chat_title: None,
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
            page,
            store,
            transport: Arc::new(WebhookClient::new()),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_webhook_url(mut self, url: Option<String>) -> Self {
        self.webhook_url = url;
        self
    }

    pub fn with_chat_title(mut self, title: impl Into<String>) -> Self {
        self.chat_title = Some(title.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn WebhookTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Which branch a [`ConversationSession::send_message`] call took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank text; nothing happened.
    Ignored,
    /// Another round trip is in flight; nothing happened.
    Busy,
    /// No webhook URL; a notice was raised and nothing was appended.
    NotConfigured,
    /// The webhook answered; `added` replies survived de-duplication.
    Delivered { added: usize },
    /// The turn failed; a synthetic agent message was appended.
    Failed(SendFailure),
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<Message>,
    thread_id: Option<String>,
    webhook_url: Option<String>,
}

/// Clears the loading flag on every exit path of a send.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ConversationSession {
    state: RwLock<State>,
    is_open: AtomicBool,
    is_loading: AtomicBool,
    instance_key: Option<String>,
    chat_title: Option<String>,
    timeout: Duration,
    page: Arc<dyn PageContext>,
    storage: ChatStorage,
    transport: Arc<dyn WebhookTransport>,
    notifier: Arc<dyn Notifier>,
}

impl ConversationSession {
    /// Create a session, hydrating messages and thread id from the instance's storage.
    pub fn new(options: SessionOptions) -> Self {
        let instance_key = options.page.instance_key();
        let storage = ChatStorage::new(options.store, instance_key.as_deref());
        let state = State {
            messages: storage.load_messages(),
            thread_id: storage.load_thread_id(),
            webhook_url: clean_url(options.webhook_url),
        };
        log::debug!(
            "session {} hydrated with {} messages",
            instance_key.as_deref().unwrap_or("(default)"),
            state.messages.len()
        );
        Self {
            state: RwLock::new(state),
            is_open: AtomicBool::new(false),
            is_loading: AtomicBool::new(false),
            instance_key,
            chat_title: options.chat_title,
            timeout: options.timeout,
            page: options.page,
            storage,
            transport: options.transport,
            notifier: options.notifier,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn instance_key(&self) -> Option<&str> {
        self.instance_key.as_deref()
    }

    pub fn chat_title(&self) -> Option<&str> {
        self.chat_title.as_deref()
    }

    /// Snapshot of the conversation, in order.
    pub fn messages(&self) -> Vec<Message> {
        self.read_state().messages.clone()
    }

    pub fn thread_id(&self) -> Option<String> {
        self.read_state().thread_id.clone()
    }

    pub fn webhook_url(&self) -> Option<String> {
        self.read_state().webhook_url.clone()
    }

    /// Replace the webhook URL at runtime; blank clears it.
    pub fn set_webhook_url(&self, url: impl Into<String>) {
        let url = clean_url(Some(url.into()));
        log::debug!("webhook url set: {}", url.as_deref().unwrap_or("(none)"));
        self.write_state().webhook_url = url;
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// True exactly while a webhook round trip is outstanding.
    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    /// Flip the open/closed flag; returns the new value.
    pub fn toggle_chat(&self) -> bool {
        !self.is_open.fetch_xor(true, Ordering::SeqCst)
    }

    /// Clear messages and thread id, in memory and in storage.
    pub fn reset_chat(&self) {
        let mut state = self.write_state();
        state.messages.clear();
        state.thread_id = None;
        self.storage.clear();
    }

    fn begin_loading(&self) -> Option<LoadingGuard<'_>> {
        self.is_loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| LoadingGuard(&self.is_loading))
    }

    /// Run one user turn against the webhook.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        let Some(url) = self.webhook_url() else {
            log::warn!("send skipped: webhook url is not set");
            self.notifier.notify(&SendFailure::NotConfigured.notice());
            return SendOutcome::NotConfigured;
        };
        let Some(_loading) = self.begin_loading() else {
            log::debug!("send skipped: a request is already in flight");
            return SendOutcome::Busy;
        };

        let request = {
            let mut state = self.write_state();
            state.messages.push(Message::user(text));
            self.storage.save_messages(&state.messages);
            self.build_request(text, &state)
        };

        match self.exchange(&url, &request).await {
            Ok(response) => self.apply_response(response),
            Err(failure) => self.apply_failure(failure),
        }
    }

    fn build_request(&self, text: &str, state: &State) -> WebhookRequest {
        let ids = self.page.pass_through_ids();
        WebhookRequest {
            message: text.to_string(),
            messages: state.messages.clone(),
            thread_id: state.thread_id.clone(),
            chat_title: self.chat_title.clone(),
            page_url: Some(self.page.page_url().to_string()),
            user_id: ids.user_id,
            module_id: ids.module_id,
        }
    }

    /// POST with the timeout ceiling; dropping the transport future on timeout cancels
    /// the request without waiting for it to settle. `Ok(None)` means no parse strategy
    /// could read the body.
    async fn exchange(
        &self,
        url: &str,
        request: &WebhookRequest,
    ) -> Result<Option<WebhookResponse>, SendFailure> {
        log::debug!("sending message to webhook {}", url);
        let reply = match tokio::time::timeout(self.timeout, self.transport.post(url, request)).await
        {
            Err(_) => return Err(SendFailure::Timeout),
            Ok(Err(WebhookError::Timeout)) => return Err(SendFailure::Timeout),
            Ok(Err(WebhookError::Network(e))) => return Err(SendFailure::Network(e)),
            Ok(Ok(reply)) => reply,
        };
        if !reply.is_success() {
            return Err(SendFailure::Status {
                status: reply.status,
                body: reply.body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        let (response, strategy) = parse_with_strategy(&reply.body);
        if strategy.is_none() {
            return Ok(None);
        }
        if response.is_error() {
            return Err(SendFailure::Webhook(response.error.unwrap_or_default()));
        }
        Ok(Some(response))
    }

    /// Append webhook replies. Only messages the webhook sent go through de-duplication;
    /// the fallback for an unreadable or empty reply is always appended.
    fn apply_response(&self, response: Option<WebhookResponse>) -> SendOutcome {
        let (batch, top_level_thread_id) = match response {
            Some(r) => (
                r.messages.iter().map(normalize_message).collect::<Vec<_>>(),
                r.thread_id,
            ),
            None => (Vec::new(), None),
        };

        let mut state = self.write_state();
        let fresh = if batch.is_empty() {
            log::warn!("no readable messages in webhook response");
            vec![Message::agent(UNREADABLE_RESPONSE_TEXT)]
        } else {
            retain_new(batch, &state.messages)
        };
        let candidate = fresh
            .iter()
            .find_map(|m| m.thread_id.clone())
            .or(top_level_thread_id);
        if let Some(thread_id) = candidate {
            if state.thread_id.as_deref() != Some(thread_id.as_str()) {
                log::info!("adopting thread id {}", thread_id);
                self.storage.save_thread_id(Some(&thread_id));
                state.thread_id = Some(thread_id);
            }
        }

        let added = fresh.len();
        if added == 0 {
            log::debug!("no new messages in webhook response");
        } else {
            state.messages.extend(fresh);
            self.storage.save_messages(&state.messages);
        }
        SendOutcome::Delivered { added }
    }

    fn apply_failure(&self, failure: SendFailure) -> SendOutcome {
        log::warn!("webhook turn failed: {}", failure);
        self.notifier.notify(&failure.notice());
        let mut state = self.write_state();
        state.messages.push(Message::agent(FAILED_TURN_TEXT));
        self.storage.save_messages(&state.messages);
        SendOutcome::Failed(failure)
    }
}

fn clean_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
}
