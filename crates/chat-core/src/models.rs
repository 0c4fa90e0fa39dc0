use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::identity::CanonicalId;

/// Identifier of a two-party conversation, always `conversation_<opaque>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an id read back from storage. Freshly minted ids come from
    /// [`crate::ids::conversation_id_for`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One side of a conversation: storage key plus the name shown to the other side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: CanonicalId,
    pub display_name: String,
}

impl Participant {
    pub fn new(id: CanonicalId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// Photo or video attachment, already uploaded to the blob store. Only
/// absolute URLs are representable, so every attachment survives storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub url: Url,
    /// Asset name the client renders until the download finishes
    pub placeholder: String,
}

impl Media {
    pub const DEFAULT_PLACEHOLDER: &'static str = "placeholder";

    pub fn new(url: Url) -> Self {
        Self {
            url,
            placeholder: Self::DEFAULT_PLACEHOLDER.to_string(),
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Content of a message. Attributed text, emoji, audio, contact cards and
/// custom payloads are not supported.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Text(String),
    Photo(Media),
    Video(Media),
    Location(Location),
}

impl MessageKind {
    /// Discriminator written to the persisted record's `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageKind::Text(_) => "text",
            MessageKind::Photo(_) => "photo",
            MessageKind::Video(_) => "video",
            MessageKind::Location(_) => "location",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender: Participant,
    pub sent_at: DateTime<Utc>,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(id: impl Into<String>, sender: Participant, kind: MessageKind) -> Self {
        Self {
            id: id.into(),
            sender,
            sent_at: Utc::now(),
            kind,
        }
    }

    pub fn sent_at(mut self, at: DateTime<Utc>) -> Self {
        self.sent_at = at;
        self
    }
}

/// Preview of the newest message, denormalized into each index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestMessage {
    pub date: DateTime<Utc>,
    pub message: String,
    pub is_read: bool,
}

/// Per-user summary row stored under `/{user}/conversations`.
///
/// Each participant owns a copy, so listing conversations never needs a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationIndexEntry {
    pub id: ConversationId,
    pub other_user_email: CanonicalId,
    pub name: String,
    pub latest_message: LatestMessage,
}

impl ConversationIndexEntry {
    /// Expand the entry into the two-party view seen by `owner`.
    pub fn to_conversation(&self, owner: &CanonicalId) -> Conversation {
        Conversation {
            id: self.id.clone(),
            participants: [owner.clone(), self.other_user_email.clone()],
            counterpart_name: self.name.clone(),
            latest: self.latest_message.clone(),
        }
    }
}

/// Two-party conversation as seen by one of its participants
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Owner first, counterpart second
    pub participants: [CanonicalId; 2],
    pub counterpart_name: String,
    pub latest: LatestMessage,
}

impl Conversation {
    pub fn counterpart(&self) -> &CanonicalId {
        &self.participants[1]
    }
}

/// User profile row stored at `/{user}`; also the users collection scanned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}
