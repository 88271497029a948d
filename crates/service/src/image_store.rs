//! Image persistence, format validation, and thumbnailing are external
//! collaborators: storage on the filesystem is out of scope, but the
//! behavioral contract — format detection and thumbnail generation — is
//! honored here as a trait boundary, the same way `Repository` stands in
//! for the database.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStoreError {
    /// Neither a PNG nor a JPEG signature was found.
    UnrecognizedFormat,
    Io(String),
}

impl std::fmt::Display for ImageStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageStoreError::UnrecognizedFormat => write!(f, "unrecognized image format"),
            ImageStoreError::Io(detail) => write!(f, "image store I/O error: {detail}"),
        }
    }
}

impl std::error::Error for ImageStoreError {}

/// A stored image or thumbnail's identifier, opaque to this crate:
/// `UpdateProfile` persists the new image and thumbnail, then atomically
/// swaps their identifiers in the database row.
pub type ImageId = String;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Format detection by content, not by file extension: `UpdateProfile`
    /// image bytes must be valid PNG/JPEG.
    fn validate_image_format(&self, bytes: &[u8]) -> Result<ImageFormat, ImageStoreError>;

    async fn save_image(&self, identity_id: &[u8; 32], bytes: &[u8]) -> Result<ImageId, ImageStoreError>;

    /// Reads an image's bytes back, for `IdentityLookup`.
    async fn load_image(&self, image: &ImageId) -> Result<Vec<u8>, ImageStoreError>;

    async fn generate_thumbnail(&self, image: &ImageId) -> Result<ImageId, ImageStoreError>;

    /// Best-effort: a crash between the database commit and this delete
    /// can leak files; that risk is accepted rather than making the
    /// delete part of the transaction.
    async fn delete_image(&self, image: &ImageId) -> Result<(), ImageStoreError>;
}

/// Sniffs the first bytes of a PNG (`\x89PNG\r\n\x1a\n`) or JPEG (`\xFF\xD8`)
/// stream. Shared by any `ImageStore` implementation that wants real format
/// detection instead of trusting a caller-supplied tag.
pub fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, ImageStoreError> {
    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8];

    if bytes.starts_with(PNG_MAGIC) {
        Ok(ImageFormat::Png)
    } else if bytes.starts_with(JPEG_MAGIC) {
        Ok(ImageFormat::Jpeg)
    } else {
        Err(ImageStoreError::UnrecognizedFormat)
    }
}

/// An ephemeral, process-local `ImageStore` (see [`crate::repository::memory`]
/// for the same tradeoff on the hosting table).
pub mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    pub struct InMemoryImageStore {
        next_id: AtomicU64,
        images: Mutex<HashMap<ImageId, Vec<u8>>>,
    }

    impl InMemoryImageStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn fresh_id(&self) -> ImageId {
            format!("img-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
        }
    }

    #[async_trait]
    impl ImageStore for InMemoryImageStore {
        fn validate_image_format(&self, bytes: &[u8]) -> Result<ImageFormat, ImageStoreError> {
            sniff_format(bytes)
        }

        async fn save_image(&self, _identity_id: &[u8; 32], bytes: &[u8]) -> Result<ImageId, ImageStoreError> {
            let id = self.fresh_id();
            self.images.lock().insert(id.clone(), bytes.to_vec());
            Ok(id)
        }

        async fn load_image(&self, image: &ImageId) -> Result<Vec<u8>, ImageStoreError> {
            self.images.lock().get(image).cloned().ok_or(ImageStoreError::UnrecognizedFormat)
        }

        async fn generate_thumbnail(&self, image: &ImageId) -> Result<ImageId, ImageStoreError> {
            let source = self
                .images
                .lock()
                .get(image)
                .cloned()
                .ok_or(ImageStoreError::UnrecognizedFormat)?;

            let id = self.fresh_id();
            self.images.lock().insert(id.clone(), source);
            Ok(id)
        }

        async fn delete_image(&self, image: &ImageId) -> Result<(), ImageStoreError> {
            self.images.lock().remove(image);
            Ok(())
        }
    }

}
