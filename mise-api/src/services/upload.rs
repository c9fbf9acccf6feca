//! Image upload validation and temporary storage
//!
//! Every uploaded file must pass, in order: an allowed extension, an image
//! content type, the per-file size limit, and a signature check on the bytes
//! themselves. Accepted files are written to the temp directory as
//! `<upload_id>_<uuid>.<ext>` and removed once detection is done.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use mise_common::config::UploadConfig;

/// Content types a client may declare
const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Types accepted after sniffing the file signature
const ALLOWED_SIGNATURES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File has no name")]
    MissingFilename,

    #[error("Invalid file: {0} (unsupported extension)")]
    Extension(String),

    #[error("Invalid file: {0} (unsupported content type {1})")]
    ContentType(String, String),

    #[error("Invalid file: {name} is {size} bytes, limit is {limit}")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("Invalid file: {0} is not a recognized image")]
    NotAnImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An upload that passed every check
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub filename: String,
    pub extension: String,
    /// Sniffed from the bytes, not taken from the client
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Limits applied to each uploaded file
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_size: usize,
    pub max_images: usize,
    pub allowed_extensions: Vec<String>,
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_size: config.max_upload_size,
            max_images: config.max_images,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl UploadPolicy {
    pub fn validate(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
        data: Vec<u8>,
    ) -> Result<ValidatedImage, UploadError> {
        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or(UploadError::MissingFilename)?
            .to_string();

        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .filter(|e| self.allowed_extensions.contains(e))
            .ok_or_else(|| UploadError::Extension(filename.clone()))?;

        let declared = content_type.unwrap_or_default().to_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&declared.as_str()) {
            return Err(UploadError::ContentType(filename, declared));
        }

        if data.len() > self.max_size {
            return Err(UploadError::TooLarge {
                name: filename,
                size: data.len(),
                limit: self.max_size,
            });
        }

        let mime_type = match infer::get(&data) {
            Some(kind) if ALLOWED_SIGNATURES.contains(&kind.mime_type()) => kind.mime_type(),
            _ => return Err(UploadError::NotAnImage(filename)),
        };

        Ok(ValidatedImage {
            filename,
            extension,
            mime_type: mime_type.to_string(),
            data,
        })
    }
}

/// Temporary upload directory
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one image of an upload, returning its path
    pub async fn save(
        &self,
        upload_id: Uuid,
        image: &ValidatedImage,
    ) -> Result<PathBuf, UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("{}_{}.{}", upload_id, Uuid::new_v4(), image.extension));
        tokio::fs::write(&path, &image.data).await?;
        debug!(path = %path.display(), bytes = image.data.len(), "Saved upload");
        Ok(path)
    }

    /// Read back a file written by [`save`](Self::save)
    pub async fn load(&self, path: &Path) -> Result<Vec<u8>, UploadError> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Best-effort removal of the given files
    pub async fn discard(&self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), "Failed to remove temp file: {}", e);
            }
        }
    }

    /// Remove every leftover file of an upload, returning how many were removed
    pub async fn cleanup(&self, upload_id: Uuid) -> Result<usize, UploadError> {
        let prefix = format!("{}_", upload_id);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if matches {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        debug!(%upload_id, removed, "Cleaned up upload");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_accepts_png() {
        let image = UploadPolicy::default()
            .validate(Some("Fridge.PNG"), Some("image/png"), PNG.to_vec())
            .unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn test_sniffed_type_wins_over_declared() {
        let image = UploadPolicy::default()
            .validate(Some("photo.png"), Some("image/png"), JPEG.to_vec())
            .unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn test_rejections() {
        let policy = UploadPolicy::default();

        assert!(matches!(
            policy.validate(None, Some("image/png"), PNG.to_vec()),
            Err(UploadError::MissingFilename)
        ));
        assert!(matches!(
            policy.validate(Some("notes.txt"), Some("image/png"), PNG.to_vec()),
            Err(UploadError::Extension(_))
        ));
        assert!(matches!(
            policy.validate(Some("a.png"), Some("text/plain"), PNG.to_vec()),
            Err(UploadError::ContentType(_, _))
        ));
        assert!(matches!(
            policy.validate(Some("a.png"), Some("image/png"), b"plain text".to_vec()),
            Err(UploadError::NotAnImage(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let policy = UploadPolicy {
            max_size: 8,
            ..Default::default()
        };
        assert!(matches!(
            policy.validate(Some("a.png"), Some("image/png"), PNG.to_vec()),
            Err(UploadError::TooLarge { size: 12, limit: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_save_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("temp"));
        let image = UploadPolicy::default()
            .validate(Some("a.jpg"), Some("image/jpeg"), JPEG.to_vec())
            .unwrap();

        let upload_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let first = store.save(upload_id, &image).await.unwrap();
        store.save(upload_id, &image).await.unwrap();
        let other = store.save(other_id, &image).await.unwrap();

        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("{}_", upload_id)));
        assert!(name.ends_with(".jpg"));
        assert_eq!(store.load(&first).await.unwrap(), JPEG);

        assert_eq!(store.cleanup(upload_id).await.unwrap(), 2);
        assert!(!first.exists());
        assert!(other.exists());

        store.discard(&[other.clone()]).await;
        assert!(!other.exists());
    }

    #[tokio::test]
    async fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("never-created"));
        assert_eq!(store.cleanup(Uuid::new_v4()).await.unwrap(), 0);
    }
}
