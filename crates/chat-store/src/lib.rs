//! chat-store: local backends for chat-core.
//!
//! Directory layout:
//! ```text
//! chat_data/
//! ├── documents/tree.json   # document tree (profiles, indexes, message logs)
//! ├── blobs/                # uploaded media plus .meta.json sidecars
//! └── local/users.json      # accounts (bcrypt hashes)
//! ```

pub mod auth;
pub mod blob_store;
pub mod config;
pub mod json_store;

use anyhow::Context;
use chat_core::{ConversationResolver, MediaUploader, UserDirectory};
use std::sync::Arc;
use tracing::info;

pub use auth::LocalAuthService;
pub use blob_store::{BlobMetadata, FsBlobStore};
pub use config::StoreConfig;
pub use json_store::JsonDocumentStore;

/// The three local backends opened over one data directory.
#[derive(Clone)]
pub struct LocalBackends {
    pub documents: Arc<JsonDocumentStore>,
    pub blobs: Arc<FsBlobStore>,
    pub auth: Arc<LocalAuthService>,
}

impl LocalBackends {
    pub async fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        config.ensure_dirs().await?;

        let documents = JsonDocumentStore::open(config)
            .await
            .context("Failed to open document store")?;
        let blobs = FsBlobStore::new(&config.blob_dir)
            .await
            .context("Failed to initialize blob store")?;
        let auth = LocalAuthService::open(config)
            .await
            .context("Failed to initialize auth")?;

        info!("[Store] Local backends ready under {:?}", config.storage_dir);
        Ok(Self {
            documents: Arc::new(documents),
            blobs: Arc::new(blobs),
            auth: Arc::new(auth),
        })
    }

    pub fn resolver(&self) -> ConversationResolver {
        ConversationResolver::new(self.documents.clone())
    }

    pub fn users(&self) -> UserDirectory {
        UserDirectory::new(self.documents.clone())
    }

    pub fn media(&self) -> MediaUploader {
        MediaUploader::new(self.blobs.clone())
    }
}
