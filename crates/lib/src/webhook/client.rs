//! HTTP transport for webhook calls.
//!
//! The body is always returned as text, regardless of status, so that the session can
//! hand it to the tolerant parser or include it in an error report.

use async_trait::async_trait;

use super::protocol::WebhookRequest;

/// Status and raw body of a completed webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The transport gave up waiting (its own timeout, distinct from the session ceiling).
    #[error("webhook request timed out")]
    Timeout,
    /// Connection refused, DNS failure, offline, or the body could not be read.
    #[error("webhook request failed: {0}")]
    Network(String),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WebhookError::Timeout
        } else {
            WebhookError::Network(e.to_string())
        }
    }
}

/// Delivers one request to a webhook URL. Implemented over HTTP by [`WebhookClient`];
/// tests substitute scripted transports.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, request: &WebhookRequest) -> Result<HttpReply, WebhookError>;
}

/// reqwest-backed transport: POST JSON, read the full body as text.
#[derive(Clone, Default)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebhookTransport for WebhookClient {
    async fn post(&self, url: &str, request: &WebhookRequest) -> Result<HttpReply, WebhookError> {
        log::debug!("posting message to webhook {}", url);
        let res = self.client.post(url).json(request).send().await?;
        let status = res.status().as_u16();
        let body = res.text().await?;
        log::debug!("webhook replied {} ({} bytes)", status, body.len());
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let reply = |status| HttpReply {
            status,
            body: String::new(),
        };
        assert!(reply(200).is_success());
        assert!(reply(204).is_success());
        assert!(!reply(302).is_success());
        assert!(!reply(429).is_success());
        assert!(!reply(500).is_success());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let client = WebhookClient::new();
        let request = WebhookRequest {
            message: "hi".to_string(),
            messages: Vec::new(),
            thread_id: None,
            chat_title: None,
            page_url: None,
            user_id: None,
            module_id: None,
        };
        let err = client
            .post("http://127.0.0.1:1/hook", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Network(_)));
    }
}
