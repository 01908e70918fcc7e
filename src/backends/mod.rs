//! Segmenter implementations
//!
//! - [`MaskImageSegmenter`]: a pre-computed mask stored as a grayscale image
//! - [`SourceAlphaSegmenter`]: the source image's own alpha channel
//! - `test_utils`: deterministic fakes for tests and benchmarks (unit tests,
//!   or the `test-utils` feature)

pub mod mask_file;
pub mod source_alpha;

// Test utilities for segmenter testing
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use self::mask_file::MaskImageSegmenter;
pub use self::source_alpha::SourceAlphaSegmenter;
