/// Image payload validation and compression policy
use crate::error::{Result, StarError};
use std::sync::Arc;
use tracing::debug;

/// Maximum compressed image size accepted onto the wire (5MB)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Lossy re-encode quality (70% quality)
pub const COMPRESSION_QUALITY: u8 = 70;

/// Collaborator that owns pixel decode/re-encode.
///
/// The host platform supplies the real codec; the core only decides quality
/// and enforces the size budget.
pub trait ImageTranscoder: Send + Sync {
    /// Decode `raw` as an image and re-encode it lossily at `quality`
    /// percent. Fails if the input is not a decodable image.
    fn transcode(&self, raw: &[u8], quality: u8) -> Result<Vec<u8>>;
}

/// Enforces the wire size budget around a single transcoder pass
#[derive(Clone)]
pub struct ImagePolicy {
    transcoder: Arc<dyn ImageTranscoder>,
}

impl ImagePolicy {
    pub fn new(transcoder: Arc<dyn ImageTranscoder>) -> Self {
        Self { transcoder }
    }

    /// One compression pass, then the budget check. An oversized result is
    /// rejected, not re-compressed.
    pub fn prepare(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let compressed = self.transcoder.transcode(raw, COMPRESSION_QUALITY)?;
        if compressed.len() > MAX_IMAGE_BYTES {
            return Err(StarError::ImageTooLarge {
                size: compressed.len(),
            });
        }
        debug!(
            "Prepared image payload: {} -> {} bytes",
            raw.len(),
            compressed.len()
        );
        Ok(compressed)
    }
}

/// Passthrough transcoder for hosts whose platform layer already compressed
/// the pixels: verifies the bytes look like a known image format and hands
/// them back unchanged.
pub struct SniffTranscoder;

impl ImageTranscoder for SniffTranscoder {
    fn transcode(&self, raw: &[u8], _quality: u8) -> Result<Vec<u8>> {
        if !is_known_image(raw) {
            return Err(StarError::InvalidImage("Failed to decode image".to_string()));
        }
        Ok(raw.to_vec())
    }
}

fn is_known_image(data: &[u8]) -> bool {
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G'];
    const GIF: &[u8] = b"GIF8";

    data.starts_with(JPEG)
        || data.starts_with(PNG)
        || data.starts_with(GIF)
        || (data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP")
}
