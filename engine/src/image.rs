//! Reading image files into inline request data.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use bodycode_types::InlineImage;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unsupported image type for {} (expected png, jpg, jpeg, webp, gif, heic or heif)", path.display())]
    UnsupportedType { path: PathBuf },
}

/// MIME type declared for a file, from its extension.
#[must_use]
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => return None,
    };
    Some(mime)
}

#[must_use]
pub fn encode_image(mime_type: &str, bytes: &[u8]) -> InlineImage {
    InlineImage::new(mime_type, STANDARD.encode(bytes))
}

/// Read `path` and base64-encode it. Contents are not inspected.
pub async fn load_image(path: &Path) -> Result<InlineImage, ImageError> {
    let mime_type = mime_type_for(path).ok_or_else(|| ImageError::UnsupportedType {
        path: path.to_path_buf(),
    })?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ImageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), mime_type, "Loaded image");
    Ok(encode_image(mime_type, &bytes))
}
