//! Segmenter backed by a pre-computed mask image

use crate::{
    error::{BgRemovalError, Result},
    segmenter::Segmenter,
    types::{PixelBuffer, ProbabilityMap},
};
use async_trait::async_trait;
use image::GrayImage;
use std::{path::Path, sync::Arc};

/// Serves a stored grayscale mask as the probability map
///
/// White (255) is certain foreground and black (0) certain background. The
/// mask may be smaller than the image as long as it has the same aspect
/// ratio; the refiner upsamples it.
#[derive(Debug, Clone)]
pub struct MaskImageSegmenter {
    map: Arc<ProbabilityMap>,
    name: String,
}

impl MaskImageSegmenter {
    /// Use an in-memory grayscale mask
    #[must_use]
    pub fn from_luma(mask: &GrayImage) -> Self {
        Self {
            map: Arc::new(ProbabilityMap::from_luma(mask)),
            name: "mask-image".to_string(),
        }
    }

    /// Decode a mask from encoded image bytes (any colour type is reduced to luma)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mask = image::load_from_memory(bytes)
            .map_err(|e| BgRemovalError::unsupported_format(format!("Unreadable mask: {}", e)))?;
        Ok(Self::from_luma(&mask.to_luma8()))
    }

    /// Load a mask image from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            BgRemovalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read mask '{}': {}", path.display(), e),
            ))
        })?;
        let mut segmenter = Self::from_bytes(&bytes)?;
        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            segmenter.name = format!("mask-image:{}", file_name);
        }
        Ok(segmenter)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.map.dimensions()
    }
}

#[async_trait]
impl Segmenter for MaskImageSegmenter {
    async fn segment(&self, _image: &PixelBuffer) -> Result<ProbabilityMap> {
        Ok(self.map.as_ref().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
