//! Core data types for the refinement and compositing pipeline

use crate::error::{BgRemovalError, Result};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, RgbaImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Decoded source image: straight-alpha RGBA, 8 bits per channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Wrap an already decoded RGBA image
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Build a buffer from raw RGBA samples
    ///
    /// # Errors
    /// - `DimensionMismatch` when `data.len() != width * height * 4`
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        RgbaImage::from_raw(width, height, data)
            .map(Self::new)
            .ok_or_else(|| {
                BgRemovalError::dimension_mismatch(format!(
                    "{}x{} RGBA buffer needs {} bytes, got {}",
                    width, height, expected, actual
                ))
            })
    }

    /// Build a buffer with every pixel computed by `f`
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 4],
    {
        Self::new(RgbaImage::from_fn(width, height, |x, y| image::Rgba(f(x, y))))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of pixels
    #[must_use]
    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// RGBA sample at `(x, y)`; panics when out of bounds
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.image.get_pixel(x, y).0
    }

    /// Flat RGBA samples in row-major order
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

fn sanitize_probability(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-cell foreground likelihood, stored row-major as `(height, width)`
///
/// Values are clamped to `[0, 1]` on construction (NaN becomes 0), whatever
/// the segmenter produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    values: Array2<f32>,
}

impl ProbabilityMap {
    /// Create a map from row-major values
    ///
    /// # Errors
    /// - `MaskShape` when `values.len() != width * height`
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let len = values.len();
        let array = Array2::from_shape_vec((height as usize, width as usize), values).map_err(
            |_| {
                BgRemovalError::mask_shape(format!(
                    "{}x{} probability map needs {} values, got {}",
                    width,
                    height,
                    width as usize * height as usize,
                    len
                ))
            },
        )?;
        Ok(Self::from_array(array))
    }

    /// Create a map from an `(height, width)` array
    #[must_use]
    pub fn from_array(mut values: Array2<f32>) -> Self {
        values.mapv_inplace(sanitize_probability);
        Self { values }
    }

    /// Create a map with every cell computed by `f(x, y)`
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> f32,
    {
        let values = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            f(x as u32, y as u32)
        });
        Self::from_array(values)
    }

    /// Interpret a grayscale image as probabilities (`0 → 0.0`, `255 → 1.0`)
    #[must_use]
    pub fn from_luma(image: &GrayImage) -> Self {
        Self::from_fn(image.width(), image.height(), |x, y| {
            f32::from(image.get_pixel(x, y).0[0]) / 255.0
        })
    }

    /// Wrap values the caller has already kept inside `[0, 1]`
    pub(crate) fn from_clamped(values: Array2<f32>) -> Self {
        debug_assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        Self { values }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.values.ncols() as u32
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.values.nrows() as u32
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `(x, y)`, or `None` outside the map
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.values.get((y as usize, x as usize)).copied()
    }

    #[must_use]
    pub fn as_array(&self) -> &Array2<f32> {
        &self.values
    }
}

/// Edge softness (negative) to sharpness (positive), clamped to `[-10, 10]`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "i32", into = "i32")]
pub struct RefinementParameter(i8);

impl RefinementParameter {
    pub const MIN: i32 = -10;
    pub const MAX: i32 = 10;
    pub const NEUTRAL: Self = Self(0);

    /// Create a parameter, clamping out-of-range values
    #[must_use]
    pub fn new(value: i32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX) as i8)
    }

    #[must_use]
    pub fn value(self) -> i32 {
        i32::from(self.0)
    }

    #[must_use]
    pub fn is_neutral(self) -> bool {
        self.0 == 0
    }

    /// Feather magnitude for negative values
    #[must_use]
    pub fn softness(self) -> Option<u32> {
        (self.0 < 0).then(|| u32::from(self.0.unsigned_abs()))
    }

    /// Steepening magnitude for positive values
    #[must_use]
    pub fn sharpness(self) -> Option<u32> {
        (self.0 > 0).then(|| u32::from(self.0.unsigned_abs()))
    }

    /// Every valid parameter, softest first
    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self::new)
    }
}

impl From<i32> for RefinementParameter {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<RefinementParameter> for i32 {
    fn from(parameter: RefinementParameter) -> Self {
        parameter.value()
    }
}

impl std::fmt::Display for RefinementParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

/// Per-pixel alpha at source resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaChannel {
    data: Vec<u8>,
    dimensions: (u32, u32),
}

impl AlphaChannel {
    /// Create a new alpha channel
    ///
    /// # Errors
    /// - `DimensionMismatch` when `data.len() != width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgRemovalError::dimension_mismatch(format!(
                "{}x{} alpha channel needs {} values, got {}",
                dimensions.0,
                dimensions.1,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Alpha channel with the same value everywhere
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    /// Create alpha channel from a grayscale image
    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self {
            data: image.as_raw().clone(),
            dimensions: image.dimensions(),
        }
    }

    /// Convert alpha channel to a grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        GrayImage::from_raw(width, height, self.data.clone())
            .ok_or_else(|| BgRemovalError::internal("Failed to create image from alpha data"))
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    /// Alpha at `(x, y)`, or `None` outside the channel
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return None;
        }
        self.data
            .get(y as usize * self.dimensions.0 as usize + x as usize)
            .copied()
    }

    /// Count foreground, background and transition-band pixels
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&a| a == u8::MAX).count();
        let background_pixels = self.data.iter().filter(|&&a| a == 0).count();
        let transition_pixels = total_pixels - foreground_pixels - background_pixels;
        let ratio = |count: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                count as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            transition_pixels,
            foreground_ratio: ratio(foreground_pixels),
            transition_ratio: ratio(transition_pixels),
        }
    }

    /// Save alpha channel as a grayscale PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let image = self.to_image()?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Statistics about an alpha channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    /// Pixels at alpha 255
    pub foreground_pixels: usize,
    /// Pixels at alpha 0
    pub background_pixels: usize,
    /// Pixels strictly between 0 and 255
    pub transition_pixels: usize,
    pub foreground_ratio: f32,
    pub transition_ratio: f32,
}

/// Timing breakdown for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the uploaded bytes (zero on reprocess)
    pub decode_ms: u64,

    /// Segmenter call (zero on reprocess)
    pub segmentation_ms: u64,

    /// Upsampling and edge shaping
    pub refine_ms: u64,

    /// Alpha compositing
    pub composite_ms: u64,

    /// Container encoding, if the result was encoded
    pub encode_ms: Option<u64>,

    /// End-to-end time for the request
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Fraction of the total spent in refine and composite
    #[must_use]
    pub fn interactive_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            (self.refine_ms + self.composite_ms) as f64 / self.total_ms as f64
        }
    }

    /// Get timing summary for display
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Segment: {}ms | Refine: {}ms | Composite: {}ms",
            self.total_ms, self.decode_ms, self.segmentation_ms, self.refine_ms, self.composite_ms
        );
        if let Some(encode_ms) = self.encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }
        summary
    }
}

/// Metadata about the processing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Name of the segmenter that produced the probability map
    pub segmenter: String,

    /// Parameter the result was rendered with
    pub parameter: RefinementParameter,

    /// Probability map resolution before upsampling
    pub map_dimensions: (u32, u32),

    /// Whether the defringe pass ran
    pub defringed: bool,

    /// Detailed timing breakdown
    pub timings: ProcessingTimings,

    /// When the result was produced
    pub created_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(segmenter: String, parameter: RefinementParameter) -> Self {
        Self {
            segmenter,
            parameter,
            map_dimensions: (0, 0),
            defringed: false,
            timings: ProcessingTimings::default(),
            created_at: Utc::now(),
        }
    }
}

/// Final transparent-background image plus a content identifier
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Straight-alpha RGBA output
    pub image: PixelBuffer,

    /// Hex SHA-256 of the dimensions and pixel data
    pub content_hash: String,

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl CompositeResult {
    #[must_use]
    pub fn new(image: PixelBuffer, metadata: ProcessingMetadata) -> Self {
        let content_hash = Self::compute_hash(&image);
        Self {
            image,
            content_hash,
            metadata,
        }
    }

    /// Content hash of a pixel buffer, stable across runs and platforms
    #[must_use]
    pub fn compute_hash(image: &PixelBuffer) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image.width().to_le_bytes());
        hasher.update(image.height().to_le_bytes());
        hasher.update(image.as_raw());
        format!("{:x}", hasher.finalize())
    }

    /// Parameter the result was rendered with
    #[must_use]
    pub fn parameter(&self) -> RefinementParameter {
        self.metadata.parameter
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get the image as straight RGBA bytes
    #[must_use]
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.image.as_raw().to_vec()
    }

    /// Get the image as premultiplied RGBA bytes
    #[must_use]
    pub fn to_premultiplied_bytes(&self) -> Vec<u8> {
        let mut bytes = self.to_rgba_bytes();
        for pixel in bytes.chunks_exact_mut(4) {
            let alpha = u16::from(pixel[3]);
            for channel in &mut pixel[..3] {
                *channel = ((u16::from(*channel) * alpha + 127) / 255) as u8;
            }
        }
        bytes
    }

    /// Extract the alpha channel of the output
    #[must_use]
    pub fn alpha_channel(&self) -> AlphaChannel {
        let data = self.image.as_raw().chunks_exact(4).map(|p| p[3]).collect();
        AlphaChannel {
            data,
            dimensions: self.dimensions(),
        }
    }

    #[must_use]
    pub fn to_dynamic_image(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.image.as_image().clone())
    }

    /// Get timing summary for display
    #[must_use]
    pub fn timing_summary(&self) -> String {
        self.metadata.timings.summary()
    }
}
