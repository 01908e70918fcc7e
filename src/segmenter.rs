//! Segmentation capability
//!
//! A segmenter turns source pixels into a foreground probability map at the
//! same or a lower resolution. The session calls it at most once per image
//! and caches the result, so implementations may be slow (a model, a remote
//! service) without affecting parameter changes.

use crate::{
    error::Result,
    types::{PixelBuffer, ProbabilityMap},
};
use async_trait::async_trait;

/// Foreground/background segmentation
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Produce a probability map for `image`
    ///
    /// The returned map must keep the image's aspect ratio. Values are
    /// clamped to [0, 1] by [`ProbabilityMap`] regardless of what the
    /// implementation writes.
    ///
    /// # Errors
    /// Any failure; the session reports it as `Segmentation`.
    async fn segment(&self, image: &PixelBuffer) -> Result<ProbabilityMap>;

    /// Short name recorded in result metadata
    fn name(&self) -> &str;
}
