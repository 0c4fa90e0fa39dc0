//! In-memory collaborators
//!
//! Reference implementations of the store and auth traits. The stores can be
//! told to reject writes, which is how partial-failure paths are exercised.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info};
use url::Url;

use crate::error::{AuthError, StoreError};
use crate::session::{validate_credentials, UserSession};
use crate::store::{AuthService, BlobStore, DocumentStore, Subscription, SubscriptionHandle};
use crate::tree;
use crate::watch::Watchers;

/// Injected write failures
#[derive(Debug, Default)]
struct Faults {
    /// Writes at or below any of these paths are rejected
    prefixes: Vec<Vec<String>>,
    /// Reject this many upcoming writes, whatever their path
    fail_next: usize,
}

impl Faults {
    fn check(&mut self, path: &str, segments: &[String]) -> Result<(), StoreError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(StoreError::WriteRejected {
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let blocked = self
            .prefixes
            .iter()
            .any(|prefix| segments.len() >= prefix.len() && tree::overlaps(prefix, segments));
        if blocked {
            return Err(StoreError::WriteRejected {
                path: path.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        Ok(())
    }
}

/// Document tree held in memory
pub struct MemoryDocumentStore {
    root: RwLock<Value>,
    watchers: Watchers,
    faults: Mutex<Faults>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
            watchers: Watchers::new(),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Reject every write at or below `prefix` until [`clear_faults`](Self::clear_faults).
    pub fn fail_writes_under(&self, prefix: &str) -> Result<(), StoreError> {
        let segments = tree::split_path(prefix)?;
        self.faults.lock().prefixes.push(segments);
        Ok(())
    }

    /// Reject the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.faults.lock().fail_next = count;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.watchers.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = tree::split_path(path)?;
        let root = self.root.read();
        Ok(tree::get(&root, &segments).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = tree::split_path(path)?;
        self.faults.lock().check(path, &segments)?;

        let mut root = self.root.write();
        tree::set(&mut root, &segments, value)?;
        self.watchers.notify(&root, &segments);
        debug!("[Store] Wrote {}", path);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let segments = tree::split_path(path)?;
        let root = self.root.read();
        let current = tree::get(&root, &segments).cloned().unwrap_or(Value::Null);
        Ok(self.watchers.register(segments, current))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.watchers.remove(handle);
    }
}

/// Blob store held in memory; URLs use the `memory` scheme.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
    fail_uploads: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        *self.fail_uploads.lock() = fail;
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.blobs.read().get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, data: Bytes, path: &str) -> Result<(), StoreError> {
        if *self.fail_uploads.lock() {
            return Err(StoreError::WriteRejected {
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        debug!("[Blob] Stored {} ({} bytes)", path, data.len());
        self.blobs.write().insert(path.to_string(), data);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<Url, StoreError> {
        if !self.blobs.read().contains_key(path) {
            return Err(StoreError::BlobNotFound(path.to_string()));
        }
        Url::parse(&format!("memory://blobs/{}", path))
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", path, e)))
    }
}

/// Auth service held in memory; passwords are kept as SHA-256 digests.
pub struct MemoryAuthService {
    users: RwLock<HashMap<String, String>>,
    current: RwLock<Option<UserSession>>,
    session_lifetime: Duration,
}

impl Default for MemoryAuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthService {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            session_lifetime: Duration::days(30),
        }
    }

    fn digest(password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn start_session(&self, email: &str) -> UserSession {
        let session = UserSession::new(email, self.session_lifetime);
        *self.current.write() = Some(session.clone());
        session
    }
}

#[async_trait]
impl AuthService for MemoryAuthService {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        let key = email.trim().to_lowercase();
        let matches = self
            .users
            .read()
            .get(&key)
            .map(|hash| *hash == Self::digest(password))
            .unwrap_or(false);
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }
        info!("[Auth] Signed in {}", key);
        Ok(self.start_session(&key))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserSession, AuthError> {
        validate_credentials(email, password)?;
        let key = email.trim().to_lowercase();
        {
            let mut users = self.users.write();
            if users.contains_key(&key) {
                return Err(AuthError::EmailTaken(key));
            }
            users.insert(key.clone(), Self::digest(password));
        }
        info!("[Auth] Registered {}", key);
        Ok(self.start_session(&key))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.write().take();
        Ok(())
    }

    async fn current_user_email(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|session| !session.is_expired())
            .map(|session| session.email.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_missing_path_is_none() {
        let store = MemoryDocumentStore::new();
        assert_eq!(store.read("/nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = MemoryDocumentStore::new();
        store.write("/a-b-com/name", json!("A")).await.unwrap();
        assert_eq!(store.read("/a-b-com").await.unwrap(), Some(json!({"name": "A"})));
    }

    #[tokio::test]
    async fn test_subscription_sees_descendant_writes() {
        let store = MemoryDocumentStore::new();
        let mut sub = store.subscribe("/conv/messages").await.unwrap();
        assert_eq!(sub.next().await, Some(Value::Null));

        store.write("/conv/messages", json!([{"id": "m1"}])).await.unwrap();
        assert_eq!(sub.next().await, Some(json!([{"id": "m1"}])));

        store.write("/other", json!(1)).await.unwrap();
        assert!(sub.try_next().is_none());

        store.unsubscribe(sub.handle()).await;
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryDocumentStore::new();
        store.fail_writes_under("/bob-y-com").unwrap();
        assert!(store.write("/bob-y-com/conversations", json!([])).await.is_err());
        assert!(store.write("/alice-x-com/conversations", json!([])).await.is_ok());

        store.clear_faults();
        store.fail_next_writes(1);
        assert!(store.write("/x", json!(1)).await.is_err());
        assert!(store.write("/x", json!(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_path_rejected() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.write("/a.b", json!(1)).await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_array_index_writes_keep_elements() {
        let store = MemoryDocumentStore::new();
        store
            .write("/u/conversations", json!([{"id": "a"}, {"id": "b"}]))
            .await
            .unwrap();
        store.write("/u/conversations/2", json!({"id": "c"})).await.unwrap();
        assert!(matches!(
            store.write("/u/conversations/9", json!({"id": "z"})).await,
            Err(StoreError::InvalidPath(_))
        ));
        store.write("/u/conversations/0", Value::Null).await.unwrap();

        assert_eq!(
            store.read("/u/conversations").await.unwrap(),
            Some(json!([{"id": "b"}, {"id": "c"}]))
        );
    }

    #[tokio::test]
    async fn test_blob_urls() {
        let blobs = MemoryBlobStore::new();
        assert!(matches!(
            blobs.download_url("images/x.png").await,
            Err(StoreError::BlobNotFound(_))
        ));
        blobs.upload(Bytes::from_static(b"png"), "images/x.png").await.unwrap();
        let url = blobs.download_url("images/x.png").await.unwrap();
        assert_eq!(url.as_str(), "memory://blobs/images/x.png");
    }

    #[tokio::test]
    async fn test_auth_flow() {
        let auth = MemoryAuthService::new();
        assert_eq!(auth.current_user_email().await, None);

        auth.sign_up("Alice@X.com", "secret1").await.unwrap();
        assert_eq!(auth.current_user_email().await.as_deref(), Some("alice@x.com"));
        assert!(matches!(
            auth.sign_up("alice@x.com", "secret1").await,
            Err(AuthError::EmailTaken(_))
        ));

        auth.sign_out().await.unwrap();
        assert_eq!(auth.current_user_email().await, None);
        assert!(matches!(
            auth.sign_in("alice@x.com", "wrong-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        auth.sign_in("alice@x.com", "secret1").await.unwrap();
        assert!(auth.current_user_email().await.is_some());
    }
}
