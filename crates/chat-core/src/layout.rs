//! Document store layout
//!
//! ```text
//! /{user}                    {name, email}   profile row, scanned by user search
//! /{user}/conversations      [index entry]   per-user conversation index
//! /{conversation}/messages   [record]        append-only message log
//! ```

use crate::identity::CanonicalId;
use crate::models::ConversationId;

pub const ROOT: &str = "/";

pub fn profile_path(user: &CanonicalId) -> String {
    format!("/{}", user)
}

pub fn profile_field_path(user: &CanonicalId, field: &str) -> String {
    format!("/{}/{}", user, field)
}

pub fn index_path(user: &CanonicalId) -> String {
    format!("/{}/conversations", user)
}

pub fn messages_path(conversation: &ConversationId) -> String {
    format!("/{}/messages", conversation)
}
