//! Image upload seam.
//!
//! Clients send images inline as a data URI (`data:image/png;base64,...`) or
//! as bare base64. An [`ImageUploader`] turns that into a URL. The bundled
//! [`LocalUploader`] stores files content-addressed on disk and the web layer
//! serves them back under `/uploads/`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

use crate::crypto::content_hash;

/// Maximum decoded image size (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const UPLOADS_URL_PREFIX: &str = "/uploads";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is not valid base64")]
    InvalidEncoding,
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("image exceeds maximum size of {MAX_IMAGE_BYTES} bytes")]
    TooLarge,
    #[error("blob store error: {0}")]
    Store(String),
}

/// An image decoded from its inline transport form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn extension(&self) -> &'static str {
        extension_for(self.content_type).unwrap_or("bin")
    }
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Store the image and return the URL it can be fetched from.
    async fn upload(&self, image: &str) -> Result<String, UploadError>;
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

const SUPPORTED: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    SUPPORTED
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

pub fn content_type_for_ext(ext: &str) -> Option<&'static str> {
    let ext = if ext == "jpeg" { "jpg" } else { ext };
    SUPPORTED
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(ct, _)| *ct)
}

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Decode a data URI or bare base64 string into image bytes.
///
/// The declared type of a data URI must be a supported image type; bare
/// base64 is identified by its magic bytes.
pub fn decode_image(input: &str) -> Result<DecodedImage, UploadError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UploadError::Empty);
    }

    let (declared, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',').ok_or(UploadError::InvalidEncoding)?;
            let mime = meta
                .strip_suffix(";base64")
                .ok_or(UploadError::InvalidEncoding)?;
            (Some(mime.to_ascii_lowercase()), data)
        }
        None => (None, input),
    };

    // Base64 inflates by 4/3; reject before decoding anything huge.
    if payload.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
        return Err(UploadError::TooLarge);
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| UploadError::InvalidEncoding)?;
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(UploadError::TooLarge);
    }

    let content_type = match declared {
        Some(mime) => SUPPORTED
            .iter()
            .find(|(ct, _)| *ct == mime || (mime == "image/jpg" && *ct == "image/jpeg"))
            .map(|(ct, _)| *ct)
            .ok_or(UploadError::UnsupportedType(mime))?,
        None => sniff(&bytes).ok_or_else(|| UploadError::UnsupportedType("unknown".to_string()))?,
    };

    Ok(DecodedImage {
        content_type,
        bytes,
    })
}

// ---------------------------------------------------------------------------
// Local content-addressed store
// ---------------------------------------------------------------------------

/// Writes images to `{root}/{sha256}.{ext}`. Identical images share a file.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a served file name to a path inside the store.
    ///
    /// Only names of the form `<64 hex>.<known ext>` resolve.
    pub fn resolve(&self, file: &str) -> Option<(PathBuf, &'static str)> {
        let (stem, ext) = file.split_once('.')?;
        if stem.len() != 64 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let content_type = content_type_for_ext(ext)?;
        Some((self.root.join(file), content_type))
    }
}

#[async_trait]
impl ImageUploader for LocalUploader {
    async fn upload(&self, image: &str) -> Result<String, UploadError> {
        let decoded = decode_image(image)?;
        let name = format!("{}.{}", content_hash(&decoded.bytes), decoded.extension());
        let path = self.root.join(&name);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(format!("{UPLOADS_URL_PREFIX}/{name}"));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| UploadError::Store(e.to_string()))?;
        // Write then rename so a reader never sees a partial file.
        let tmp = self.root.join(format!("{name}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &decoded.bytes)
            .await
            .map_err(|e| UploadError::Store(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| UploadError::Store(e.to_string()))?;

        tracing::debug!(
            "uploads: stored {} ({} bytes)",
            name,
            decoded.bytes.len()
        );
        Ok(format!("{UPLOADS_URL_PREFIX}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn png_data_uri() -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(PNG_HEADER))
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("rapport-uploads-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn decodes_data_uri() {
        let img = decode_image(&png_data_uri()).unwrap();
        assert_eq!(img.content_type, "image/png");
        assert_eq!(img.bytes, PNG_HEADER);
        assert_eq!(img.extension(), "png");
    }

    #[test]
    fn sniffs_bare_base64() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3];
        let img = decode_image(&STANDARD.encode(jpeg)).unwrap();
        assert_eq!(img.content_type, "image/jpeg");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(decode_image("   "), Err(UploadError::Empty)));
        assert!(matches!(
            decode_image("data:image/png;base64,@@@"),
            Err(UploadError::InvalidEncoding)
        ));
        assert!(matches!(
            decode_image(&format!("data:text/html;base64,{}", STANDARD.encode(b"<p>"))),
            Err(UploadError::UnsupportedType(_))
        ));
        assert!(matches!(
            decode_image(&STANDARD.encode(b"plain text")),
            Err(UploadError::UnsupportedType(_))
        ));
    }

    #[test]
    fn rejects_oversized_image() {
        let mut big = PNG_HEADER.to_vec();
        big.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            decode_image(&STANDARD.encode(&big)),
            Err(UploadError::TooLarge)
        ));
    }

    #[tokio::test]
    async fn local_upload_is_content_addressed() {
        let root = temp_root();
        let uploader = LocalUploader::new(&root);

        let first = uploader.upload(&png_data_uri()).await.unwrap();
        let second = uploader.upload(&png_data_uri()).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("/uploads/"));
        assert!(first.ends_with(".png"));

        let file = first.trim_start_matches("/uploads/");
        let (path, content_type) = uploader.resolve(file).unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(std::fs::read(path).unwrap(), PNG_HEADER);

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn resolve_rejects_traversal() {
        let uploader = LocalUploader::new("/tmp/x");
        assert!(uploader.resolve("../etc/passwd").is_none());
        assert!(uploader.resolve(&format!("{}.exe", "a".repeat(64))).is_none());
        assert!(uploader.resolve(&format!("{}.png", "g".repeat(64))).is_none());
        assert!(uploader.resolve(&format!("{}.png", "a".repeat(64))).is_some());
    }
}
