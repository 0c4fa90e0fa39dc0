//! Collaborator interfaces: authentication, document store and blob store.
//!
//! Every method is a suspension point. Implementations may complete calls in
//! any order; the directory never assumes ordering across independent calls.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{AuthError, StoreError};
use crate::session::UserSession;

/// Abstraction for sign-in state.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserSession, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserSession, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    async fn current_user_email(&self) -> Option<String>;
}

/// Abstraction for the JSON document tree.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// `None` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the subtree at `path`. Writing `Value::Null` deletes it.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Watch `path`. The current value is delivered first, then the full
    /// value again after every write that touches the path.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;

    async fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Abstraction for uploaded media.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn upload(&self, data: Bytes, path: &str) -> Result<(), StoreError>;
    async fn download_url(&self, path: &str) -> Result<Url, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Live view of one document path.
///
/// Each item is the whole value at the path (`Value::Null` when empty), never
/// a delta.
pub struct Subscription {
    handle: SubscriptionHandle,
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub fn new(handle: SubscriptionHandle, receiver: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { handle, receiver }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Wait for the next snapshot. `None` once the store has dropped the watch.
    pub async fn next(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Next snapshot if one is already queued.
    pub fn try_next(&mut self) -> Option<Value> {
        self.receiver.try_recv().ok()
    }
}
