//! Error types for the chat directory and its collaborators.

use std::io;
use thiserror::Error;

use crate::identity::CanonicalId;
use crate::models::ConversationId;

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Failures reported by a document or blob store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Write rejected at {path}: {reason}")]
    WriteRejected { path: String, reason: String },

    #[error("Read failed at {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Checksum mismatch for blob {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by the authentication service.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid sign-up input: {0}")]
    InvalidInput(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Auth backend error: {0}")]
    Backend(String),
}

/// A persisted message record that cannot be turned back into a [`Message`](crate::models::Message).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Unrecognized message type: {0:?}")]
    UnrecognizedType(Option<String>),

    #[error("Malformed {kind} content: {reason}")]
    MalformedContent { kind: &'static str, reason: String },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

/// Errors surfaced by the resolver, user directory and media uploader.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write failed at {path}: {source}")]
    WriteFailure {
        path: String,
        #[source]
        source: StoreError,
    },

    /// The message log and the caller's index entry were written but the
    /// counterpart's entry was not. Nothing is rolled back.
    #[error("Conversation {conversation_id} partially created: no index entry for {missing}: {source}")]
    PartialWrite {
        conversation_id: ConversationId,
        written: Vec<CanonicalId>,
        missing: CanonicalId,
        #[source]
        source: StoreError,
    },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("No user signed in")]
    NotSignedIn,
}

impl DirectoryError {
    pub(crate) fn write(path: impl Into<String>, source: StoreError) -> Self {
        DirectoryError::WriteFailure {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound(_))
    }
}
