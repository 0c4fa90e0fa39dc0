//! Local backend configuration

use chrono::Duration;
use std::path::PathBuf;

/// Where the local backends keep their files
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory holding the document tree file
    pub storage_dir: PathBuf,
    /// Blob storage directory
    pub blob_dir: PathBuf,
    /// Registered accounts (bcrypt hashes)
    pub users_file: PathBuf,
    /// How long a sign-in stays valid
    pub session_lifetime: Duration,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let root = std::env::var("CHAT_ROOT").unwrap_or_else(|_| "chat_data".to_string());
        Self::with_base_dir(root)
    }
}

impl StoreConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            storage_dir: base_dir.join("documents"),
            blob_dir: base_dir.join("blobs"),
            users_file: base_dir.join("local").join("users.json"),
            session_lifetime: Duration::days(30),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn documents_file(&self) -> PathBuf {
        self.storage_dir.join("tree.json")
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        tokio::fs::create_dir_all(&self.blob_dir).await?;
        if let Some(parent) = self.users_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}
