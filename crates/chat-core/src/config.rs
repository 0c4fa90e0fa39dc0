//! Directory configuration

/// Settings for the conversation directory
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    /// Index preview shown for photo messages instead of the raw URL
    pub photo_preview: String,
    /// Index preview shown for video messages
    pub video_preview: String,
    /// Index preview shown for location messages
    pub location_preview: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            photo_preview: "[Photo]".to_string(),
            video_preview: "[Video]".to_string(),
            location_preview: "[Location]".to_string(),
        }
    }
}
