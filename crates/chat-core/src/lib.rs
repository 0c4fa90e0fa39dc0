//! chat-core: conversation and message directory for a two-party chat client.
//!
//! - **identity**: email → canonical storage key.
//! - **resolver**: create-vs-reuse of conversations, message logs, per-user indexes.
//! - **codec**: message ⇄ persisted record.
//! - **users** / **media**: profile rows, user search and blob uploads.
//!
//! Storage, blobs and sign-in are reached only through the traits in [`store`].

pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod layout;
pub mod media;
pub mod memory;
pub mod models;
pub mod resolver;
pub mod session;
pub mod store;
pub mod tree;
pub mod users;
pub mod watch;

// Top-level re-exports for common usage
pub use crate::config::DirectoryConfig;
pub use crate::error::{AuthError, DecodeError, DirectoryError, Result, StoreError};
pub use crate::identity::{canonicalize, CanonicalId};
pub use crate::media::MediaUploader;
pub use crate::models::{
    Conversation, ConversationId, ConversationIndexEntry, LatestMessage, Location, Media, Message,
    MessageKind, Participant, UserProfile,
};
pub use crate::resolver::{ConversationFeed, ConversationResolver, ConversationTarget, MessageFeed};
pub use crate::session::{SessionContext, UserSession};
pub use crate::store::{AuthService, BlobStore, DocumentStore, Subscription, SubscriptionHandle};
pub use crate::users::UserDirectory;
