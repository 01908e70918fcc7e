//! Output container encoding
//!
//! All supported formats are lossless and keep the alpha channel, so
//! decoding an encoded result gives back the composited pixels exactly.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    types::CompositeResult,
};
use image::{
    codecs::{png::PngEncoder, tiff::TiffEncoder},
    ExtendedColorType, ImageEncoder,
};
use std::{io::Cursor, path::Path};

/// Encodes composite results into downloadable containers
pub trait OutputEncoder: Send + Sync {
    /// Encode `result` as `format`
    ///
    /// # Errors
    /// - `UnsupportedFormat` when the format is not compiled in
    /// - `Image` when the encoder fails
    fn encode(&self, result: &CompositeResult, format: OutputFormat) -> Result<Vec<u8>>;
}

/// Default [`OutputEncoder`] backed by the `image` crate codecs
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageOutputEncoder;

impl ImageOutputEncoder {
    /// Output format implied by a file extension
    ///
    /// # Examples
    /// ```rust
    /// use bg_refine::{services::ImageOutputEncoder, OutputFormat};
    ///
    /// assert_eq!(ImageOutputEncoder::format_for_path("cutout.tif"), Some(OutputFormat::Tiff));
    /// assert_eq!(ImageOutputEncoder::format_for_path("cutout.jpg"), None);
    /// ```
    #[must_use]
    pub fn format_for_path<P: AsRef<Path>>(path: P) -> Option<OutputFormat> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" => Some(OutputFormat::Png),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "webp" => Some(OutputFormat::WebP),
            "rgba" | "raw" => Some(OutputFormat::Rgba8),
            _ => None,
        }
    }

    /// Encode and write `result` to `path`, creating parent directories
    pub fn save<P: AsRef<Path>>(
        &self,
        result: &CompositeResult,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode(result, format)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &bytes).map_err(|e| {
            BgRemovalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write '{}': {}", path.display(), e),
            ))
        })?;
        log::debug!(
            "Wrote {} bytes of {} to {}",
            bytes.len(),
            format,
            path.display()
        );
        Ok(())
    }
}

impl OutputEncoder for ImageOutputEncoder {
    fn encode(&self, result: &CompositeResult, format: OutputFormat) -> Result<Vec<u8>> {
        let (width, height) = result.dimensions();
        let pixels = result.image.as_raw();
        let mut bytes = Vec::new();

        match format {
            OutputFormat::Png => {
                PngEncoder::new(&mut bytes).write_image(
                    pixels,
                    width,
                    height,
                    ExtendedColorType::Rgba8,
                )?;
            },
            OutputFormat::Tiff => {
                TiffEncoder::new(Cursor::new(&mut bytes)).write_image(
                    pixels,
                    width,
                    height,
                    ExtendedColorType::Rgba8,
                )?;
            },
            #[cfg(feature = "webp-support")]
            OutputFormat::WebP => {
                image::codecs::webp::WebPEncoder::new_lossless(&mut bytes).write_image(
                    pixels,
                    width,
                    height,
                    ExtendedColorType::Rgba8,
                )?;
            },
            #[cfg(not(feature = "webp-support"))]
            OutputFormat::WebP => {
                return Err(BgRemovalError::unsupported_format(
                    "WebP output requires the webp-support feature",
                ));
            },
            OutputFormat::Rgba8 => bytes.extend_from_slice(pixels),
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PixelBuffer, ProcessingMetadata, RefinementParameter};

    fn sample_result() -> CompositeResult {
        let image = PixelBuffer::from_fn(6, 4, |x, y| {
            if x < 3 {
                [(x * 40) as u8, (y * 60) as u8, 90, 255]
            } else if x == 3 {
                [10, 20, 30, 128]
            } else {
                [0, 0, 0, 0]
            }
        });
        CompositeResult::new(
            image,
            ProcessingMetadata::new("test".to_string(), RefinementParameter::NEUTRAL),
        )
    }

    #[test]
    fn test_png_is_lossless() {
        let result = sample_result();
        let bytes = ImageOutputEncoder.encode(&result, OutputFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.as_raw(), result.image.as_raw());
    }

    #[test]
    fn test_tiff_is_lossless() {
        let result = sample_result();
        let bytes = ImageOutputEncoder.encode(&result, OutputFormat::Tiff).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.as_raw(), result.image.as_raw());
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_webp_keeps_alpha() {
        let result = sample_result();
        let bytes = ImageOutputEncoder.encode(&result, OutputFormat::WebP).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (6, 4));
        let alpha: Vec<u8> = decoded.pixels().map(|p| p[3]).collect();
        assert_eq!(alpha, result.alpha_channel().data());
    }

    #[test]
    fn test_rgba8_is_raw_pixels() {
        let result = sample_result();
        let bytes = ImageOutputEncoder.encode(&result, OutputFormat::Rgba8).unwrap();
        assert_eq!(bytes.len(), 6 * 4 * 4);
        assert_eq!(bytes, result.to_rgba_bytes());
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(ImageOutputEncoder::format_for_path("a.PNG"), Some(OutputFormat::Png));
        assert_eq!(ImageOutputEncoder::format_for_path("a.webp"), Some(OutputFormat::WebP));
        assert_eq!(ImageOutputEncoder::format_for_path("a.raw"), Some(OutputFormat::Rgba8));
        assert_eq!(ImageOutputEncoder::format_for_path("noext"), None);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        ImageOutputEncoder
            .save(&sample_result(), &path, OutputFormat::Png)
            .unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (6, 4));
    }
}
