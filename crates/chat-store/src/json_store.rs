//! JSON file document store
//!
//! The whole tree lives in memory and in one JSON file. Every write replaces
//! the file atomically (temp file, then rename) before the in-memory tree and
//! the subscribers see the change.

use anyhow::Context;
use async_trait::async_trait;
use chat_core::store::{DocumentStore, Subscription, SubscriptionHandle};
use chat_core::tree;
use chat_core::watch::Watchers;
use chat_core::StoreError;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::StoreConfig;

pub struct JsonDocumentStore {
    path: PathBuf,
    root: RwLock<Value>,
    watchers: Watchers,
}

impl JsonDocumentStore {
    /// Open (or create) the tree file named by `config`.
    pub async fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;
        let path = config.documents_file();

        let root = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse document tree {:?}", path))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read document tree {:?}", path))
            }
        };

        info!("[Store] Document tree loaded from {:?}", path);
        Ok(Self {
            path,
            root: RwLock::new(root),
            watchers: Watchers::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscriber_count(&self) -> usize {
        self.watchers.len()
    }

    /// Save the tree to disk atomically
    async fn save(&self, root: &Value) -> Result<(), StoreError> {
        let temp_path = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(root)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = tree::split_path(path)?;
        let root = self.root.read().await;
        Ok(tree::get(&root, &segments).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = tree::split_path(path)?;
        let mut root = self.root.write().await;

        let mut next = root.clone();
        tree::set(&mut next, &segments, value)?;
        if let Err(e) = self.save(&next).await {
            error!("[Store] Failed to persist write at {}: {}", path, e);
            return Err(StoreError::WriteRejected {
                path: path.to_string(),
                reason: e.to_string(),
            });
        }

        *root = next;
        self.watchers.notify(&root, &segments);
        debug!("[Store] Wrote {}", path);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let segments = tree::split_path(path)?;
        let root = self.root.read().await;
        let current = tree::get(&root, &segments).cloned().unwrap_or(Value::Null);
        Ok(self.watchers.register(segments, current))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.watchers.remove(handle) {
            debug!("[Store] Unsubscribed {:?}", handle);
        }
    }
}
