//! Message and conversation identifiers.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::identity::CanonicalId;
use crate::models::ConversationId;

pub const CONVERSATION_PREFIX: &str = "conversation_";

/// Characters replaced with `-` when a message id becomes a path segment.
/// `/` is included because it is the path separator.
const UNSAFE_SEGMENT_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// Make `raw` usable as a single document-store path segment.
pub fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| if UNSAFE_SEGMENT_CHARS.contains(&c) { '-' } else { c })
        .collect()
}

/// Conversation id derived from the id of the conversation's first message.
pub fn conversation_id_for(first_message_id: &str) -> ConversationId {
    ConversationId::new(format!(
        "{}{}",
        CONVERSATION_PREFIX,
        sanitize_segment(first_message_id)
    ))
}

/// Mints message ids of the form
/// `<other>_<sender>_<YYYY-MM-DDTHH:MM:SS.mmmZ>_<seq>-<nonce>`.
///
/// The timestamp keeps ids sortable. The sequence number separates ids minted
/// by this generator within one millisecond. The nonce separates generators
/// (two devices of the same sender).
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    seq: AtomicU64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, other: &CanonicalId, sender: &CanonicalId, at: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let nonce = Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}_{}_{:06}-{}",
            other,
            sender,
            at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            seq,
            &nonce[..8]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::canonicalize;
    use crate::tree;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_replaces_forbidden_characters() {
        assert_eq!(sanitize_segment("a.b#c$d[e]f/g"), "a-b-c-d-e-f-g");
        assert_eq!(sanitize_segment("plain_id"), "plain_id");
    }

    #[test]
    fn test_conversation_id_is_a_valid_path_segment() {
        let id = conversation_id_for("bob-y-com_alice-x-com_2024-07-03T10:00:00.123Z_000001-abcd");
        assert!(id.as_str().starts_with(CONVERSATION_PREFIX));
        assert!(!id.as_str().contains('.'));
        let segments = tree::split_path(&format!("/{}/messages", id)).unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn test_ids_are_unique_within_one_millisecond() {
        let ids = MessageIdGenerator::new();
        let at = Utc.with_ymd_and_hms(2024, 7, 3, 10, 0, 0).unwrap();
        let other = canonicalize("bob@y.com");
        let me = canonicalize("alice@x.com");

        let first = ids.next_id(&other, &me, at);
        let second = ids.next_id(&other, &me, at);
        assert_ne!(first, second);
        assert!(first.starts_with("bob-y-com_alice-x-com_2024-07-03T10:00:00.000Z_"));
    }

    #[test]
    fn test_ids_sort_by_time() {
        let ids = MessageIdGenerator::new();
        let other = canonicalize("bob@y.com");
        let me = canonicalize("alice@x.com");
        let earlier = ids.next_id(&other, &me, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let later = ids.next_id(&other, &me, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(earlier < later);
    }
}
