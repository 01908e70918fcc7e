//! Segmenter that reuses the source image's alpha channel

use crate::{
    error::Result,
    segmenter::Segmenter,
    types::{PixelBuffer, ProbabilityMap},
};
use async_trait::async_trait;

/// Treats the source alpha as the foreground probability
///
/// Useful for re-refining images that were already cut out elsewhere. Fully
/// opaque inputs produce an all-foreground map.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceAlphaSegmenter;

#[async_trait]
impl Segmenter for SourceAlphaSegmenter {
    async fn segment(&self, image: &PixelBuffer) -> Result<ProbabilityMap> {
        Ok(ProbabilityMap::from_fn(image.width(), image.height(), |x, y| {
            f32::from(image.pixel(x, y)[3]) / 255.0
        }))
    }

    fn name(&self) -> &str {
        "source-alpha"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alpha_becomes_probability() {
        let image = PixelBuffer::from_fn(3, 1, |x, _| [9, 9, 9, [0, 51, 255][x as usize]]);
        let map = SourceAlphaSegmenter.segment(&image).await.unwrap();
        assert_eq!(map.dimensions(), (3, 1));
        assert_eq!(map.get(0, 0), Some(0.0));
        assert!((map.get(1, 0).unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(map.get(2, 0), Some(1.0));
    }
}
