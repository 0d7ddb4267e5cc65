//! Duplicate detection against conversation history.
//!
//! A webhook may re-deliver a reply with a freshly minted id and timestamp; content
//! equality within a short window catches those as well as exact id matches.

use crate::message::Message;

/// Messages with identical text and sender closer than this are duplicates.
pub const DUPLICATE_WINDOW_MS: i64 = 5_000;

/// True if `candidate` shares an id with any existing message, or matches one on text
/// and sender within [`DUPLICATE_WINDOW_MS`].
pub fn is_duplicate(candidate: &Message, existing: &[Message]) -> bool {
    existing.iter().any(|m| m.id == candidate.id)
        || existing.iter().any(|m| {
            m.text == candidate.text
                && m.sender == candidate.sender
                && m.timestamp.abs_diff(candidate.timestamp) < DUPLICATE_WINDOW_MS as u64
        })
}

/// Keep the messages of `batch` that are not duplicates of `existing` or of an earlier
/// survivor in the same batch. Order is preserved.
pub fn retain_new(batch: Vec<Message>, existing: &[Message]) -> Vec<Message> {
    let mut accepted: Vec<Message> = Vec::with_capacity(batch.len());
    for msg in batch {
        if is_duplicate(&msg, existing) || is_duplicate(&msg, &accepted) {
            log::debug!("dropping duplicate message {}", msg.id);
            continue;
        }
        accepted.push(msg);
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Sender;

    fn msg(id: &str, text: &str, sender: Sender, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            text: text.to_string(),
            sender,
            timestamp,
            thread_id: None,
        }
    }

    #[test]
    fn same_id_is_duplicate_regardless_of_content() {
        let a = msg("x", "hello", Sender::User, 0);
        let b = msg("x", "something else", Sender::Agent, 999_999);
        assert!(is_duplicate(&b, &[a]));
    }

    #[test]
    fn same_content_inside_window_is_duplicate() {
        let a = msg("a", "hello", Sender::Agent, 10_000);
        let b = msg("b", "hello", Sender::Agent, 14_999);
        assert!(is_duplicate(&b, &[a.clone()]));
        let early = msg("c", "hello", Sender::Agent, 5_001);
        assert!(is_duplicate(&early, &[a]));
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let a = msg("a", "hello", Sender::Agent, 10_000);
        let b = msg("b", "hello", Sender::Agent, 15_000);
        assert!(!is_duplicate(&b, &[a]));
    }

    #[test]
    fn different_sender_or_text_is_not_duplicate() {
        let a = msg("a", "hello", Sender::Agent, 10_000);
        assert!(!is_duplicate(&msg("b", "hello", Sender::User, 10_000), &[a.clone()]));
        assert!(!is_duplicate(&msg("c", "hello!", Sender::Agent, 10_000), &[a]));
    }

    #[test]
    fn empty_history_has_no_duplicates() {
        assert!(!is_duplicate(&msg("a", "x", Sender::Agent, 0), &[]));
    }

    #[test]
    fn retain_new_drops_duplicates_within_batch() {
        let existing = vec![msg("a", "old", Sender::Agent, 0)];
        let batch = vec![
            msg("a", "repeat id", Sender::Agent, 100_000),
            msg("b", "fresh", Sender::Agent, 100_000),
            msg("c", "fresh", Sender::Agent, 100_500),
            msg("d", "other", Sender::Agent, 100_500),
        ];
        let kept = retain_new(batch, &existing);
        let ids: Vec<&str> = kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }
}
