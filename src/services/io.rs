//! Image decoding service
//!
//! Turns uploaded bytes into a [`PixelBuffer`]. The declared MIME type is
//! checked before any decoding work happens; the container itself is detected
//! from the content so a mislabelled `image/*` upload still decodes.

use crate::{
    error::{BgRemovalError, Result},
    types::PixelBuffer,
};
use image::ImageFormat;
use std::path::Path;

/// Decodes uploaded bytes into straight-alpha RGBA pixels
pub trait PixelSource: Send + Sync {
    /// Decode `bytes` declared as `declared_mime`
    ///
    /// # Errors
    /// - `UnsupportedFormat` for non-image MIME types or undecodable bytes
    fn decode(&self, bytes: &[u8], declared_mime: &str) -> Result<PixelBuffer>;
}

/// Default [`PixelSource`] backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageIOService;

impl ImageIOService {
    /// Whether `mime` names an image type (`image/*`, case-insensitive)
    #[must_use]
    pub fn is_image_mime(mime: &str) -> bool {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        essence.len() > "image/".len()
            && essence
                .get(..6)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
    }

    /// MIME type implied by a file extension, if the `image` crate knows it
    #[must_use]
    pub fn mime_for_path<P: AsRef<Path>>(path: P) -> Option<&'static str> {
        ImageFormat::from_path(path).ok().map(|format| format.to_mime_type())
    }

    /// Read a file together with the MIME type implied by its extension
    ///
    /// Files without a recognised extension are declared as
    /// `application/octet-stream` and will be rejected by [`PixelSource::decode`].
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bg_refine::services::{ImageIOService, PixelSource};
    ///
    /// let (bytes, mime) = ImageIOService::read_file("portrait.png")?;
    /// let pixels = ImageIOService.decode(&bytes, &mime)?;
    /// println!("{}x{}", pixels.width(), pixels.height());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<(Vec<u8>, String)> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            BgRemovalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read '{}': {}", path.display(), e),
            ))
        })?;
        let mime = Self::mime_for_path(path).unwrap_or("application/octet-stream");
        Ok((bytes, mime.to_string()))
    }
}

impl PixelSource for ImageIOService {
    fn decode(&self, bytes: &[u8], declared_mime: &str) -> Result<PixelBuffer> {
        if !Self::is_image_mime(declared_mime) {
            return Err(BgRemovalError::unsupported_format(format!(
                "'{}' is not an image type",
                declared_mime
            )));
        }
        if bytes.is_empty() {
            return Err(BgRemovalError::unsupported_format("empty upload"));
        }

        let image = image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::unsupported_format(format!(
                "Could not decode {} bytes declared as {}: {}",
                bytes.len(),
                declared_mime,
                e
            ))
        })?;
        log::debug!(
            "Decoded {}x{} image ({:?}) from {} bytes",
            image.width(),
            image.height(),
            image.color(),
            bytes.len()
        );

        let pixels = PixelBuffer::new(image.to_rgba8());
        if pixels.is_empty() {
            return Err(BgRemovalError::unsupported_format("image has zero area"));
        }
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 200]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_mime_check() {
        assert!(ImageIOService::is_image_mime("image/png"));
        assert!(ImageIOService::is_image_mime("IMAGE/JPEG"));
        assert!(ImageIOService::is_image_mime("image/webp; charset=binary"));
        assert!(!ImageIOService::is_image_mime("image/"));
        assert!(!ImageIOService::is_image_mime("text/plain"));
        assert!(!ImageIOService::is_image_mime(""));
    }

    #[test]
    fn test_decode_png_preserves_pixels() {
        let pixels = ImageIOService.decode(&png_bytes(5, 3), "image/png").unwrap();
        assert_eq!(pixels.dimensions(), (5, 3));
        assert_eq!(pixels.pixel(4, 2), [4, 2, 7, 200]);
    }

    #[test]
    fn test_decode_detects_content_despite_label() {
        let pixels = ImageIOService.decode(&png_bytes(2, 2), "image/jpeg").unwrap();
        assert_eq!(pixels.dimensions(), (2, 2));
    }

    #[test]
    fn test_decode_rejects_non_image_mime() {
        let err = ImageIOService
            .decode(&png_bytes(2, 2), "application/pdf")
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = ImageIOService
            .decode(b"definitely not an image", "image/png")
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));

        let err = ImageIOService.decode(&[], "image/png").unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(ImageIOService::mime_for_path("a/b/photo.PNG"), Some("image/png"));
        assert_eq!(ImageIOService::mime_for_path("photo.jpg"), Some("image/jpeg"));
        assert_eq!(ImageIOService::mime_for_path("notes.txt"), None);
    }
}
