//! Alpha compositing of source pixels against a refined alpha channel
//!
//! Output is straight (unpremultiplied) RGBA. Fully transparent pixels are
//! written as `[0, 0, 0, 0]` so no source colour survives under either alpha
//! convention; fully opaque pixels keep their source RGB bit for bit.
//! Partially transparent pixels keep the source colour unless defringing is
//! enabled.

use crate::{
    config::CompositorConfig,
    error::{BgRemovalError, Result},
    types::{AlphaChannel, CompositeResult, PixelBuffer, ProcessingMetadata},
};
use tracing::{debug, instrument};

/// Combines a source buffer with an alpha channel
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: CompositorConfig,
}

impl Compositor {
    #[must_use]
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Composite and wrap the output with its content hash
    ///
    /// # Errors
    /// - `DimensionMismatch` when `alpha` and `source` differ in size
    pub fn composite(
        &self,
        source: &PixelBuffer,
        alpha: &AlphaChannel,
        mut metadata: ProcessingMetadata,
    ) -> Result<CompositeResult> {
        let image = self.composite_pixels(source, alpha)?;
        metadata.defringed = self.config.defringe;
        Ok(CompositeResult::new(image, metadata))
    }

    /// Produce the straight-alpha RGBA output buffer
    ///
    /// # Errors
    /// - `DimensionMismatch` when `alpha` and `source` differ in size
    #[instrument(
        skip_all,
        fields(
            dimensions = %format!("{}x{}", source.width(), source.height()),
            defringe = self.config.defringe
        )
    )]
    pub fn composite_pixels(&self, source: &PixelBuffer, alpha: &AlphaChannel) -> Result<PixelBuffer> {
        if source.dimensions() != alpha.dimensions() {
            return Err(BgRemovalError::dimensions_differ(
                "alpha channel",
                source.dimensions(),
                alpha.dimensions(),
            ));
        }

        let mut data = Vec::with_capacity(source.as_raw().len());
        for (pixel, &a) in source.as_raw().chunks_exact(4).zip(alpha.data()) {
            if a == 0 {
                data.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], a]);
            }
        }

        if self.config.defringe {
            let adjusted = defringe(&mut data, alpha, self.config.defringe_radius);
            debug!(adjusted, "Defringed partially transparent pixels");
        }

        PixelBuffer::from_raw(source.width(), source.height(), data)
    }
}

/// Pull partially transparent pixels toward the mean colour of opaque
/// neighbours, weighted by their transparency. Returns the number of pixels
/// changed.
#[allow(clippy::indexing_slicing)]
// Safe: indices are derived from coordinates bounded by the alpha dimensions
fn defringe(data: &mut [u8], alpha: &AlphaChannel, radius: u32) -> usize {
    let (width, height) = alpha.dimensions();
    let alpha_data = alpha.data();
    let radius = radius as i64;
    let source = data.to_vec();
    let mut adjusted = 0;

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let index = (y * i64::from(width) + x) as usize;
            let a = alpha_data[index];
            if a == 0 || a == u8::MAX {
                continue;
            }

            let mut sum = [0_u64; 3];
            let mut count = 0_u64;
            for ny in (y - radius).max(0)..=(y + radius).min(i64::from(height) - 1) {
                for nx in (x - radius).max(0)..=(x + radius).min(i64::from(width) - 1) {
                    let neighbour = (ny * i64::from(width) + nx) as usize;
                    if alpha_data[neighbour] == u8::MAX {
                        for (channel, total) in sum.iter_mut().enumerate() {
                            *total += u64::from(source[neighbour * 4 + channel]);
                        }
                        count += 1;
                    }
                }
            }
            if count == 0 {
                continue;
            }

            let keep = f32::from(a) / 255.0;
            for (channel, total) in sum.iter().enumerate() {
                let mean = *total as f32 / count as f32;
                let own = f32::from(source[index * 4 + channel]);
                data[index * 4 + channel] = (own * keep + mean * (1.0 - keep)).round() as u8;
            }
            adjusted += 1;
        }
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RefinementParameter;

    fn noisy_source(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            [(x * 37 % 256) as u8, (y * 91 % 256) as u8, ((x + y) * 13 % 256) as u8, 255]
        })
    }

    #[test]
    fn test_opaque_alpha_keeps_source_rgb() {
        let source = noisy_source(8, 6);
        let alpha = AlphaChannel::filled(8, 6, 255);
        let out = Compositor::default().composite_pixels(&source, &alpha).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_transparent_alpha_clears_everything() {
        let source = noisy_source(8, 6);
        let alpha = AlphaChannel::filled(8, 6, 0);
        let out = Compositor::default().composite_pixels(&source, &alpha).unwrap();
        assert!(out.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_alpha_channel_is_copied_exactly() {
        let source = noisy_source(3, 1);
        let alpha = AlphaChannel::new(vec![0, 77, 255], (3, 1)).unwrap();
        let out = Compositor::default().composite_pixels(&source, &alpha).unwrap();
        assert_eq!(out.pixel(0, 0)[3], 0);
        assert_eq!(out.pixel(1, 0)[3], 77);
        assert_eq!(out.pixel(2, 0)[3], 255);
        // partial pixels keep source colour without defringing
        assert_eq!(&out.pixel(1, 0)[..3], &source.pixel(1, 0)[..3]);
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let source = noisy_source(4, 4);
        let alpha = AlphaChannel::filled(4, 5, 255);
        let err = Compositor::default().composite_pixels(&source, &alpha).unwrap_err();
        assert!(matches!(err, BgRemovalError::DimensionMismatch(_)));
    }

    #[test]
    fn test_defringe_pulls_edge_toward_foreground() {
        // red subject on the left, green background bleeding into the edge column
        let source = PixelBuffer::from_fn(3, 1, |x, _| match x {
            0 => [255, 0, 0, 255],
            1 => [128, 128, 0, 255],
            _ => [0, 255, 0, 255],
        });
        let alpha = AlphaChannel::new(vec![255, 128, 0], (3, 1)).unwrap();
        let compositor = Compositor::new(CompositorConfig {
            defringe: true,
            defringe_radius: 1,
        });

        let out = compositor.composite_pixels(&source, &alpha).unwrap();
        let edge = out.pixel(1, 0);
        assert!(edge[0] > 128);
        assert!(edge[1] < 128);
        assert_eq!(edge[3], 128);
        assert_eq!(out.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(out.pixel(2, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_composite_records_metadata() {
        let source = noisy_source(4, 4);
        let alpha = AlphaChannel::filled(4, 4, 255);
        let compositor = Compositor::new(CompositorConfig {
            defringe: true,
            ..CompositorConfig::default()
        });
        let metadata = ProcessingMetadata::new("test".to_string(), RefinementParameter::new(3));

        let result = compositor.composite(&source, &alpha, metadata).unwrap();
        assert!(result.metadata.defringed);
        assert_eq!(result.parameter().value(), 3);
        assert_eq!(result.content_hash, CompositeResult::compute_hash(&result.image));
    }
}
