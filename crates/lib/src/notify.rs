//! Failure classes for a chat turn and the transient notices shown for them.

/// Agent text appended to the transcript when a turn fails.
pub const FAILED_TURN_TEXT: &str =
    "Sorry, I couldn't process your message. Please try again or check the webhook URL.";

/// Why a turn did not produce webhook replies. Every class is resolved inside the
/// session; none escape to the caller as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    #[error("webhook URL is not set")]
    NotConfigured,
    #[error("webhook request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("webhook request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("webhook reported an error: {0}")]
    Webhook(String),
}

impl SendFailure {
    /// User-facing notice text for this failure class.
    pub fn notice_text(&self) -> String {
        match self {
            SendFailure::NotConfigured => "Webhook URL is not set".to_string(),
            SendFailure::Timeout => {
                "Request timed out. The webhook server took too long to respond.".to_string()
            }
            SendFailure::Network(_) => {
                "Network error. Please check your internet connection.".to_string()
            }
            SendFailure::Status { status: 429, .. } => {
                "Too many requests. Please wait a moment before trying again.".to_string()
            }
            SendFailure::Status { status, .. } if *status >= 500 => {
                "The webhook server encountered an error. Please try again later or contact support."
                    .to_string()
            }
            SendFailure::Status { status, .. } => format!(
                "Failed to send message: webhook request failed with status {}",
                status
            ),
            SendFailure::Webhook(text) if text.trim().is_empty() => {
                "Failed to send message: Unknown error from webhook".to_string()
            }
            SendFailure::Webhook(text) => format!("Failed to send message: {}", text.trim()),
        }
    }

    pub fn notice(&self) -> Notice {
        Notice {
            text: self.notice_text(),
        }
    }
}

/// A transient, user-visible error notification (a toast in the browser surface).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
}

/// Receives notices raised by a session.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Default notifier: writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        log::warn!("{}", notice.text);
    }
}
