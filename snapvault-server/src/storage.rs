//! Local media storage for uploads
//!
//! Layout under the media root:
//! - `{user}/originals/{uuid}.{ext}`
//! - `{user}/thumbnails/{uuid}.jpg` (fits within 300×300, aspect kept)
//!
//! Files are served read-only under `/media/`.

use image::ImageFormat;
use snapvault_common::models::Image;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const THUMBNAIL_SIZE: u32 = 300;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File is not a supported image")]
    NotAnImage,

    #[error("File exceeds the {0} byte upload limit")]
    TooLarge(usize),

    #[error("Empty upload")]
    Empty,

    #[error("Could not decode image: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thumbnail task failed: {0}")]
    Task(String),
}

/// Result of storing one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Public URL of the original
    pub original_url: String,
    /// Public URL of the thumbnail
    pub thumbnail_url: String,
    pub original_file: PathBuf,
    pub thumbnail_file: PathBuf,
}

/// Keep user ids safe to use as a directory name
pub fn sanitize_user_id(user_id: &str) -> String {
    let cleaned: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// JPEG thumbnail fitting within [`THUMBNAIL_SIZE`] square
pub fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| StorageError::Decode(e.to_string()))?;
    let thumbnail = image::DynamicImage::ImageRgb8(
        decoded.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8(),
    );

    let mut out = Vec::new();
    thumbnail
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .map_err(|e| StorageError::Decode(e.to_string()))?;
    Ok(out)
}

pub struct MediaStore {
    root: PathBuf,
    public_base_url: String,
    max_upload_bytes: usize,
}

impl MediaStore {
    /// Open (creating if needed) the media directory
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: &str,
        max_upload_bytes: usize,
    ) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_upload_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    fn media_prefix(&self) -> String {
        format!("{}/media/", self.public_base_url)
    }

    pub fn public_url(&self, relative: &str) -> String {
        format!("{}{}", self.media_prefix(), relative)
    }

    /// Local file behind a public media URL, if it is one of ours
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(&self.media_prefix())?;
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Validate, store the original and write its thumbnail
    pub async fn store(&self, user_id: &str, bytes: Vec<u8>) -> Result<StoredMedia, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(StorageError::TooLarge(self.max_upload_bytes));
        }
        let format = image::guess_format(&bytes).map_err(|_| StorageError::NotAnImage)?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let user_dir = sanitize_user_id(user_id);
        let id = Uuid::new_v4();
        let original_rel = format!("{}/originals/{}.{}", user_dir, id, extension);
        let thumbnail_rel = format!("{}/thumbnails/{}.jpg", user_dir, id);

        let (bytes, thumbnail) = tokio::task::spawn_blocking(move || {
            let thumbnail = make_thumbnail(&bytes);
            (bytes, thumbnail)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?;
        let thumbnail = thumbnail?;

        let original_file = self.root.join(&original_rel);
        let thumbnail_file = self.root.join(&thumbnail_rel);
        for file in [&original_file, &thumbnail_file] {
            if let Some(parent) = file.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&original_file, &bytes).await?;
        tokio::fs::write(&thumbnail_file, &thumbnail).await?;

        debug!(path = %original_file.display(), bytes = bytes.len(), "Stored upload");

        Ok(StoredMedia {
            original_url: self.public_url(&original_rel),
            thumbnail_url: self.public_url(&thumbnail_rel),
            original_file,
            thumbnail_file,
        })
    }

    /// Best-effort removal of an image's stored files
    pub async fn remove_files(&self, image: &Image) {
        let urls =
            std::iter::once(image.original_path.as_str()).chain(image.thumbnail_path.as_deref());
        for path in urls.filter_map(|url| self.local_path(url)) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed media file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove media file"),
            }
        }
    }
}
