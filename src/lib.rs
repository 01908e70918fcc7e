#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bg-refine
//!
//! Interactive mask refinement and alpha compositing for background removal.
//!
//! A segmenter produces a foreground probability map once per image; the
//! crate then turns that map into a full-resolution alpha channel whose edge
//! softness is controlled by a single value in `[-10, 10]`, and composites it
//! against the source pixels into a transparent-background RGBA image. Only
//! refinement and compositing run again when the value changes.
//!
//! ## Features
//!
//! - **Edge control**: negative values feather the cut-out edge, positive
//!   values harden it, zero keeps the segmenter's edge
//! - **Correct transparency**: background pixels are written as `[0, 0, 0, 0]`,
//!   foreground colour is untouched, optional defringing for the edge band
//! - **Interactive sessions**: cached segmentation, last-write-wins parameter
//!   changes, progress reporting at every stage
//! - **Pluggable segmentation**: any `async` [`Segmenter`]; mask-image and
//!   source-alpha segmenters are built in
//! - **Lossless output**: PNG, TIFF, WebP (feature `webp-support`) or raw RGBA8
//! - **CLI Integration**: optional `bg-refine` binary (feature `cli`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_refine::{
//!     backends::MaskImageSegmenter, services::ImageOutputEncoder, OutputFormat,
//!     RefinementParameter, RefinementSession, SessionConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let segmenter = MaskImageSegmenter::from_file("portrait-mask.png")?;
//! let session = RefinementSession::new(SessionConfig::default(), Arc::new(segmenter))?;
//!
//! session.process_file("portrait.jpg").await?;
//! if let Some(result) = session.reprocess(RefinementParameter::new(-3)).await? {
//!     ImageOutputEncoder.save(&result, "background-removed.png", OutputFormat::Png)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bar and tracing subscriber
//! - `webp-support` (default): lossless WebP output and WebP input decoding
//! - `tracing-json`: JSON log output for the CLI
//! - `test-utils`: fake segmenters in `backends::test_utils` for downstream tests
//!
//! To use only as a library without CLI dependencies:
//!
//! ```toml
//! [dependencies]
//! bg-refine = { version = "0.1", default-features = false }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod processor;
pub mod refine;
pub mod segmenter;
pub mod services;
pub mod state;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use compositor::Compositor;
pub use config::{CompositorConfig, OutputFormat, RefinerConfig, SessionConfig, SessionConfigBuilder};
pub use error::{BgRemovalError, ErrorKind, Result};
pub use processor::{CachedImage, RefinementSession, RefinementSessionBuilder, SessionError};
pub use refine::MaskRefiner;
pub use segmenter::Segmenter;
pub use services::{
    ImageIOService, ImageOutputEncoder, OutputEncoder, PixelSource, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use state::PipelineState;
pub use types::{
    AlphaChannel, CompositeResult, MaskStatistics, PixelBuffer, ProbabilityMap,
    ProcessingMetadata, ProcessingTimings, RefinementParameter,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Refine a probability map and composite it in one call
///
/// The stateless form of a session's refine and composite stages, for
/// callers that manage their own caching.
///
/// # Examples
/// ```rust
/// use bg_refine::{refine_and_composite, PixelBuffer, ProbabilityMap, RefinementParameter};
///
/// let pixels = PixelBuffer::from_fn(4, 4, |_, _| [200, 100, 50, 255]);
/// let map = ProbabilityMap::from_fn(2, 2, |x, _| if x == 0 { 0.0 } else { 1.0 });
/// let result = refine_and_composite(&pixels, &map, RefinementParameter::NEUTRAL).unwrap();
/// assert_eq!(result.dimensions(), (4, 4));
/// assert_eq!(result.image.pixel(0, 0), [0, 0, 0, 0]);
/// ```
pub fn refine_and_composite(
    source: &PixelBuffer,
    map: &ProbabilityMap,
    parameter: RefinementParameter,
) -> Result<CompositeResult> {
    refine_and_composite_with(
        source,
        map,
        parameter,
        &MaskRefiner::default(),
        &Compositor::default(),
    )
}

/// [`refine_and_composite`] with explicit refiner and compositor settings
pub fn refine_and_composite_with(
    source: &PixelBuffer,
    map: &ProbabilityMap,
    parameter: RefinementParameter,
    refiner: &MaskRefiner,
    compositor: &Compositor,
) -> Result<CompositeResult> {
    let total_start = instant::Instant::now();
    let mut timings = ProcessingTimings::default();

    let refine_start = instant::Instant::now();
    let alpha = refiner.refine(map, parameter, source.dimensions())?;
    timings.refine_ms = refine_start.elapsed().as_millis() as u64;

    let composite_start = instant::Instant::now();
    let mut metadata = ProcessingMetadata::new("external".to_string(), parameter);
    metadata.map_dimensions = map.dimensions();
    let mut result = compositor.composite(source, &alpha, metadata)?;
    timings.composite_ms = composite_start.elapsed().as_millis() as u64;
    timings.total_ms = total_start.elapsed().as_millis() as u64;
    result.metadata.timings = timings;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refine_and_composite_matches_session_stages() {
        let pixels = PixelBuffer::from_fn(8, 8, |x, y| [x as u8 * 30, y as u8 * 30, 90, 255]);
        let map = backends::test_utils::centered_square_map(4, 4);

        let result = refine_and_composite(&pixels, &map, RefinementParameter::NEUTRAL).unwrap();
        let alpha = MaskRefiner::default()
            .refine(&map, RefinementParameter::NEUTRAL, (8, 8))
            .unwrap();
        assert_eq!(result.alpha_channel(), alpha);
        assert_eq!(result.metadata.map_dimensions, (4, 4));
    }
}
