//! Media uploads
//!
//! ```text
//! message_images/photo_message_<message id>.png
//! message_videos/photo_message_<message id>.mov
//! images/<user>_profile_picture.png
//! ```

use bytes::Bytes;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::error::{DirectoryError, Result, StoreError};
use crate::identity::CanonicalId;
use crate::models::Media;
use crate::session::SessionContext;
use crate::store::BlobStore;

pub fn message_photo_path(message_id: &str) -> String {
    format!("message_images/photo_message_{}.png", blob_safe(message_id))
}

pub fn message_video_path(message_id: &str) -> String {
    format!("message_videos/photo_message_{}.mov", blob_safe(message_id))
}

pub fn profile_picture_path(user: &CanonicalId) -> String {
    format!("images/{}_profile_picture.png", user)
}

fn blob_safe(message_id: &str) -> String {
    message_id.replace([' ', '/'], "-")
}

pub struct MediaUploader {
    blobs: Arc<dyn BlobStore>,
}

impl MediaUploader {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Upload the photo for `message_id` and wrap its URL for a photo message.
    pub async fn upload_message_photo(&self, message_id: &str, data: Bytes) -> Result<Media> {
        let url = self.upload(message_photo_path(message_id), data).await?;
        Ok(Media::new(url))
    }

    pub async fn upload_message_video(&self, message_id: &str, data: Bytes) -> Result<Media> {
        let url = self.upload(message_video_path(message_id), data).await?;
        Ok(Media::new(url))
    }

    pub async fn upload_profile_picture(&self, ctx: &SessionContext, data: Bytes) -> Result<Url> {
        self.upload(profile_picture_path(ctx.id()), data).await
    }

    pub async fn profile_picture_url(&self, user: &CanonicalId) -> Result<Url> {
        let path = profile_picture_path(user);
        self.blobs.download_url(&path).await.map_err(|e| match e {
            StoreError::BlobNotFound(_) => {
                DirectoryError::NotFound(format!("profile picture for {}", user))
            }
            other => other.into(),
        })
    }

    async fn upload(&self, path: String, data: Bytes) -> Result<Url> {
        let size = data.len();
        self.blobs
            .upload(data, &path)
            .await
            .map_err(|e| DirectoryError::write(&path, e))?;
        let url = self.blobs.download_url(&path).await?;
        info!("[Media] Uploaded {} ({} bytes)", path, size);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;

    #[test]
    fn test_paths() {
        assert_eq!(
            message_photo_path("bob-y-com_alice-x-com_2024 07"),
            "message_images/photo_message_bob-y-com_alice-x-com_2024-07.png"
        );
        assert_eq!(message_video_path("m1"), "message_videos/photo_message_m1.mov");
        assert_eq!(
            profile_picture_path(&CanonicalId::from("alice@x.com")),
            "images/alice-x-com_profile_picture.png"
        );
    }

    #[tokio::test]
    async fn test_upload_photo_returns_media() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let uploader = MediaUploader::new(blobs.clone());

        let media = uploader
            .upload_message_photo("m1", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(media.url.as_str(), "memory://blobs/message_images/photo_message_m1.png");
        assert_eq!(media.placeholder, Media::DEFAULT_PLACEHOLDER);
        assert_eq!(
            blobs.get("message_images/photo_message_m1.png"),
            Some(Bytes::from_static(b"png"))
        );
    }

    #[tokio::test]
    async fn test_profile_picture() {
        let uploader = MediaUploader::new(Arc::new(MemoryBlobStore::new()));
        let alice = SessionContext::new("alice@x.com", "Alice");

        assert!(uploader
            .profile_picture_url(alice.id())
            .await
            .unwrap_err()
            .is_not_found());

        let url = uploader
            .upload_profile_picture(&alice, Bytes::from_static(b"jpg"))
            .await
            .unwrap();
        assert_eq!(uploader.profile_picture_url(alice.id()).await.unwrap(), url);
    }

    #[tokio::test]
    async fn test_failed_upload_is_write_failure() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.fail_uploads(true);
        let uploader = MediaUploader::new(blobs);
        let err = uploader
            .upload_message_video("m1", Bytes::from_static(b"mov"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::WriteFailure { .. }));
    }
}
