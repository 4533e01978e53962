use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Every stored file lives below this directory of the media root; nothing
/// else under the root is ever served.
const UPLOADS_ROOT: &str = "uploads";
/// Directory under the media root that recipe images are written to.
const RECIPE_IMAGE_DIR: &str = "uploads/recipe";
const TEMP_DIR: &str = "tmp";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("file not found")]
    NotFound,
    #[error("upload a valid image; the file was either not an image or a corrupted image")]
    InvalidImage,
    #[error("invalid media path")]
    InvalidPath,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Detects the format from the file's magic bytes.
    #[must_use]
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else {
            None
        }
    }

    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Png => &["png"],
            Self::Jpeg => &["jpg", "jpeg", "jpe"],
            Self::Gif => &["gif"],
            Self::WebP => &["webp"],
        }
    }

    #[must_use]
    pub fn canonical_extension(self) -> &'static str {
        self.extensions()[0]
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

/// Content type served for a stored file, chosen from its extension.
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Gif,
        ImageFormat::WebP,
    ]
    .into_iter()
    .find(|format| {
        ext.as_deref()
            .is_some_and(|ext| format.extensions().contains(&ext))
    })
    .map_or("application/octet-stream", ImageFormat::content_type)
}

/// Stores uploaded images below a media root. Stored paths are always
/// relative to that root and use forward slashes.
pub struct ImageStorage {
    base_path: PathBuf,
}

impl ImageStorage {
    pub fn new(media_dir: &Path) -> Self {
        Self {
            base_path: media_dir.to_path_buf(),
        }
    }

    /// Maps a stored relative path onto the filesystem. Only plain paths
    /// below the uploads directory are accepted.
    fn resolve(&self, relative: &str) -> Result<PathBuf, MediaError> {
        let path = Path::new(relative);
        let plain = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || !path.starts_with(UPLOADS_ROOT) || path == Path::new(UPLOADS_ROOT) {
            return Err(MediaError::InvalidPath);
        }
        Ok(self.base_path.join(path))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join(TEMP_DIR).join(Uuid::new_v4().to_string())
    }

    /// Validates and writes a recipe image under a fresh unique name.
    /// Returns the stored path relative to the media root.
    pub async fn put(
        &self,
        original_filename: Option<&str>,
        data: &[u8],
    ) -> Result<String, MediaError> {
        let format = ImageFormat::sniff(data).ok_or(MediaError::InvalidImage)?;
        let ext = choose_extension(original_filename, format);
        let relative = format!("{RECIPE_IMAGE_DIR}/{}.{ext}", Uuid::new_v4());

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        if let Err(e) = self.commit(&mut temp_file, &temp_path, &relative, data).await {
            drop(temp_file);
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove temp upload {}: {cleanup}",
                        temp_path.display()
                    );
                }
            }
            return Err(e);
        }

        tracing::debug!("Stored {} image at {}", format.content_type(), relative);
        Ok(relative)
    }

    /// Flushes the temp file and moves it to its final place.
    async fn commit(
        &self,
        temp_file: &mut File,
        temp_path: &Path,
        relative: &str,
        data: &[u8],
    ) -> Result<(), MediaError> {
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        let final_path = self.resolve(relative)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(temp_path, &final_path).await?;
        Ok(())
    }

    pub async fn get(&self, relative: &str) -> Result<Vec<u8>, MediaError> {
        let path = self.resolve(relative)?;
        fs::read(&path).await.map_err(MediaError::from_io)
    }

    pub async fn delete(&self, relative: &str) -> Result<bool, MediaError> {
        let path = self.resolve(relative)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Deletes a file that is no longer referenced, logging instead of failing.
    pub async fn discard(&self, relative: &str) {
        if let Err(e) = self.delete(relative).await {
            tracing::warn!("Failed to remove media file {relative}: {e}");
        }
    }
}

/// Keeps the uploaded file's extension when it matches the detected format.
fn choose_extension(original_filename: Option<&str>, format: ImageFormat) -> String {
    original_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| format.extensions().contains(&ext.as_str()))
        .unwrap_or_else(|| format.canonical_extension().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageFormat::sniff(PNG), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(JPEG), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(
            ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::sniff(b"notimage"), None);
        assert_eq!(ImageFormat::sniff(b""), None);
    }

    #[test]
    fn test_choose_extension() {
        assert_eq!(choose_extension(Some("photo.JPEG"), ImageFormat::Jpeg), "jpeg");
        assert_eq!(choose_extension(Some("photo"), ImageFormat::Png), "png");
        assert_eq!(choose_extension(None, ImageFormat::Gif), "gif");
        // A mismatched extension never decides the served content type.
        assert_eq!(choose_extension(Some("x.html"), ImageFormat::Png), "png");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("uploads/recipe/a.png"), "image/png");
        assert_eq!(content_type_for("uploads/recipe/a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("uploads/recipe/a"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(temp_dir.path());

        let path = storage.put(Some("myimage.png"), PNG).await.unwrap();
        assert!(path.starts_with("uploads/recipe/"));
        assert!(path.ends_with(".png"));
        assert!(temp_dir.path().join(&path).is_file());
        assert_eq!(storage.get(&path).await.unwrap(), PNG);
    }

    #[tokio::test]
    async fn test_put_generates_unique_names() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(temp_dir.path());

        let a = storage.put(Some("same.png"), PNG).await.unwrap();
        let b = storage.put(Some("same.png"), PNG).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_put_rejects_non_image() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(temp_dir.path());

        let result = storage.put(Some("notimage.png"), b"notimage").await;
        assert!(matches!(result, Err(MediaError::InvalidImage)));
        assert!(!temp_dir.path().join(RECIPE_IMAGE_DIR).exists());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(temp_dir.path());

        for path in [
            "../secret",
            "/etc/passwd",
            "uploads/../../x",
            "",
            "uploads",
            "tmp/partial",
            "pantry.db",
        ] {
            assert!(matches!(
                storage.get(path).await,
                Err(MediaError::InvalidPath)
            ));
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(temp_dir.path());

        let path = storage.put(None, JPEG).await.unwrap();
        assert!(storage.delete(&path).await.unwrap());
        assert!(!temp_dir.path().join(&path).exists());
        assert!(!storage.delete(&path).await.unwrap());
        assert!(matches!(
            storage.get(&path).await,
            Err(MediaError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_failed_put_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ImageStorage::new(temp_dir.path());

        // A plain file where the image directory belongs makes the final move fail.
        std::fs::create_dir_all(temp_dir.path().join(UPLOADS_ROOT)).unwrap();
        std::fs::write(temp_dir.path().join(RECIPE_IMAGE_DIR), b"").unwrap();

        let result = storage.put(Some("photo.png"), PNG).await;
        assert!(matches!(result, Err(MediaError::Io(_))));

        let leftovers = std::fs::read_dir(temp_dir.path().join(TEMP_DIR))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }
}
