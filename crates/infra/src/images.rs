//! Image ingestion: files become `data:<mime>;base64,...` blobs embedded in
//! status reports.
//!
//! Files are only read from inside the configured upload root.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("no upload directory is configured")]
    UploadsDisabled,

    #[error("{0} is outside the upload directory")]
    OutsideUploadDir(String),
}

/// MIME type for a supported image file, by extension.
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn io_error(path: &Path, e: std::io::Error) -> ImageError {
    ImageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Resolve `requested` against `root` and check that the real file lives
/// under it. Relative paths are taken from `root`; `..` and symlinks are
/// followed before the check.
pub async fn resolve_upload_path(root: &Path, requested: &Path) -> Result<PathBuf, ImageError> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| io_error(root, e))?;
    let joined = root.join(requested);
    let resolved = tokio::fs::canonicalize(&joined)
        .await
        .map_err(|e| io_error(requested, e))?;
    if !resolved.starts_with(&root) {
        return Err(ImageError::OutsideUploadDir(requested.display().to_string()));
    }
    Ok(resolved)
}

/// Read one image file into a data URL.
pub async fn read_image_data_url(path: impl AsRef<Path>) -> Result<String, ImageError> {
    let path = path.as_ref();
    let mime = mime_for(path)
        .ok_or_else(|| ImageError::UnsupportedType(path.display().to_string()))?;
    let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
    Ok(encode_data_url(mime, &bytes))
}

/// Read an image that must sit under `root`.
pub async fn read_uploaded_image(
    root: Option<&Path>,
    requested: &Path,
) -> Result<String, ImageError> {
    let root = root.ok_or(ImageError::UploadsDisabled)?;
    let path = resolve_upload_path(root, requested).await?;
    read_image_data_url(path).await
}
