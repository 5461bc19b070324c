//! Image decoding with the `image` crate

use image::RgbImage;
use tracing::debug;

use super::ImageLoader;

/// Decodes any format enabled in the `image` crate (JPEG, PNG) into RGB8
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateLoader;

impl ImageLoader for ImageCrateLoader {
    fn load(&self, bytes: &[u8]) -> Option<RgbImage> {
        match image::load_from_memory(bytes) {
            Ok(decoded) => Some(decoded.to_rgb8()),
            Err(e) => {
                debug!(len = bytes.len(), "Image decode failed: {}", e);
                None
            }
        }
    }
}
