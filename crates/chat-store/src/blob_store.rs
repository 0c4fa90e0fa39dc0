//! Filesystem blob store
//!
//! Each blob is a file under the blob directory at its own key, next to a
//! `<file>.meta.json` sidecar recording its SHA-256 hash. Reads verify the
//! hash before returning data.

use async_trait::async_trait;
use bytes::Bytes;
use chat_core::store::BlobStore;
use chat_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub key: String,
    pub content_type: Option<String>,
    /// SHA-256 hash of blob content
    pub content_hash: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        // file:// URLs need an absolute path
        let root = fs::canonicalize(root.as_ref()).await?;
        Ok(Self { root })
    }

    /// Read a blob, verifying its content hash.
    pub async fn get(&self, key: &str) -> Result<(Bytes, BlobMetadata), StoreError> {
        let file_path = self.file_path(key)?;
        let meta = self.metadata(key).await?;

        let data = match fs::read(&file_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::BlobNotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let actual_hash = sha256_hex(&data);
        if actual_hash != meta.content_hash {
            warn!("[Blob] Checksum mismatch for {}", key);
            return Err(StoreError::ChecksumMismatch {
                key: key.to_string(),
                expected: meta.content_hash,
                actual: actual_hash,
            });
        }

        Ok((Bytes::from(data), meta))
    }

    pub async fn metadata(&self, key: &str) -> Result<BlobMetadata, StoreError> {
        let meta_path = sidecar_path(&self.file_path(key)?);
        match fs::read_to_string(&meta_path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::BlobNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map a blob key to its file, rejecting keys that would escape the root.
    fn file_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.contains('\\')
            && !key.ends_with(".meta.json")
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn atomic_write(&self, dest: &Path, data: &[u8]) -> Result<(), StoreError> {
        let temp_folder = self.root.join(".tmp");
        fs::create_dir_all(&temp_folder).await?;

        let temp_path = temp_folder.join(format!("tmp_{}", uuid::Uuid::new_v4()));
        fs::write(&temp_path, data).await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, dest).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, data: Bytes, path: &str) -> Result<(), StoreError> {
        let file_path = self.file_path(path)?;
        let meta = BlobMetadata {
            key: path.to_string(),
            content_type: content_type_for(path).map(str::to_string),
            content_hash: sha256_hex(&data),
            size: data.len() as u64,
            uploaded_at: Utc::now(),
        };

        self.atomic_write(&file_path, &data).await?;
        let meta_json = serde_json::to_vec_pretty(&meta)?;
        self.atomic_write(&sidecar_path(&file_path), &meta_json).await?;

        info!("[Blob] Stored {} ({} bytes)", path, meta.size);
        Ok(())
    }

    async fn download_url(&self, path: &str) -> Result<Url, StoreError> {
        let file_path = self.file_path(path)?;
        if !fs::try_exists(&file_path).await? {
            return Err(StoreError::BlobNotFound(path.to_string()));
        }
        Url::from_file_path(&file_path).map_err(|_| StoreError::InvalidPath(path.to_string()))
    }
}

fn sidecar_path(file_path: &Path) -> PathBuf {
    let mut name = file_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".meta.json");
    file_path.with_file_name(name)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn content_type_for(key: &str) -> Option<&'static str> {
    let extension = Path::new(key).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "mov" => Some("video/quicktime"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path()).await.unwrap();

        blobs
            .upload(Bytes::from_static(b"png bytes"), "message_images/a.png")
            .await
            .unwrap();
        let (data, meta) = blobs.get("message_images/a.png").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"png bytes"));
        assert_eq!(meta.size, 9);
        assert_eq!(meta.content_type.as_deref(), Some("image/png"));

        let url = blobs.download_url("message_images/a.png").await.unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/message_images/a.png"));
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path()).await.unwrap();
        assert!(matches!(
            blobs.download_url("images/none.png").await,
            Err(StoreError::BlobNotFound(_))
        ));
        assert!(matches!(
            blobs.get("images/none.png").await,
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path()).await.unwrap();
        for key in ["../outside.png", "/etc/passwd", "", "a\\b.png", "x.png.meta.json"] {
            assert!(
                matches!(
                    blobs.upload(Bytes::from_static(b"x"), key).await,
                    Err(StoreError::InvalidPath(_))
                ),
                "{:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a/b.MOV"), Some("video/quicktime"));
        assert_eq!(content_type_for("a/b"), None);
    }
}
