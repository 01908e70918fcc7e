//! Configuration types for refinement sessions

use crate::error::{BgRemovalError, Result};
use crate::types::RefinementParameter;
use crate::utils::NumericValidator;
use instant::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lossless, alpha-preserving output containers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
    /// Lossless WebP with alpha (requires the `webp-support` feature)
    WebP,
    /// Raw straight-alpha RGBA8 pixel data (4 bytes per pixel)
    Rgba8,
}

impl OutputFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
            Self::Rgba8 => "rgba",
        }
    }

    /// MIME type of the encoded bytes
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
            Self::WebP => "image/webp",
            Self::Rgba8 => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Mask refinement tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Maximum relative aspect-ratio deviation between map and image
    pub aspect_tolerance: f32,

    /// Feather radius per softness step in pixels (None = scale with image size)
    pub feather_unit: Option<u32>,

    /// Logistic slope per sharpness step
    pub sharpness_gain: f32,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            aspect_tolerance: 0.05,
            feather_unit: None,
            sharpness_gain: 2.0,
        }
    }
}

impl RefinerConfig {
    /// Reference edge length for one pixel of feather per softness step
    pub const FEATHER_REFERENCE_EDGE: u32 = 256;

    /// Feather radius per softness step for an image of the given size
    ///
    /// One pixel per step up to 256px on the short edge, growing linearly
    /// beyond that so the visual softness stays comparable across sizes.
    #[must_use]
    pub fn feather_unit_for(&self, dimensions: (u32, u32)) -> u32 {
        self.feather_unit.unwrap_or_else(|| {
            let short_edge = dimensions.0.min(dimensions.1);
            let unit = (f64::from(short_edge) / f64::from(Self::FEATHER_REFERENCE_EDGE)).round();
            (unit as u32).max(1)
        })
    }

    /// Validate refinement settings
    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_fraction(self.aspect_tolerance, "aspect tolerance")?;
        NumericValidator::validate_positive_finite(self.sharpness_gain, "sharpness gain")?;
        if let Some(unit) = self.feather_unit {
            NumericValidator::validate_range(unit, 1, 256, "feather unit")?;
        }
        Ok(())
    }
}

/// Compositing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Pull partially transparent pixels toward nearby foreground colour
    pub defringe: bool,

    /// Neighbourhood radius searched for opaque foreground colour
    pub defringe_radius: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            defringe: false,
            defringe_radius: 2,
        }
    }
}

impl CompositorConfig {
    /// Validate compositing settings
    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_range(self.defringe_radius, 1, 8, "defringe radius")?;
        Ok(())
    }
}

/// Configuration for an interactive refinement session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on a single segmenter call in milliseconds
    pub segmentation_timeout_ms: u64,

    /// Parameter used for the first render of a new image
    pub initial_parameter: RefinementParameter,

    /// Mask refinement tuning
    pub refiner: RefinerConfig,

    /// Compositing options
    pub compositor: CompositorConfig,

    /// Container used when the session encodes results
    pub output_format: OutputFormat,

    /// Enable verbose progress reporting
    pub verbose_progress: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            segmentation_timeout_ms: 30_000,
            initial_parameter: RefinementParameter::NEUTRAL,
            refiner: RefinerConfig::default(),
            compositor: CompositorConfig::default(),
            output_format: OutputFormat::Png,
            verbose_progress: false,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bg_refine::SessionConfig;
    ///
    /// let config = SessionConfig::builder()
    ///     .segmentation_timeout_ms(5_000)
    ///     .defringe(true)
    ///     .build()
    ///     .unwrap();
    /// assert!(config.compositor.defringe);
    /// ```
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Segmenter timeout as a duration
    #[must_use]
    pub fn segmentation_timeout(&self) -> Duration {
        Duration::from_millis(self.segmentation_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - `InvalidConfig` for out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.segmentation_timeout_ms == 0 {
            return Err(BgRemovalError::config_value_error(
                "segmentation timeout (ms)",
                0,
                "1-",
                Some(30_000),
            ));
        }
        self.refiner.validate()?;
        self.compositor.validate()?;
        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("Malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BgRemovalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config '{}': {}", path.as_ref().display(), e),
            ))
        })?;
        Self::from_json_str(&json)
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn segmentation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.segmentation_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn initial_parameter(mut self, parameter: RefinementParameter) -> Self {
        self.config.initial_parameter = parameter;
        self
    }

    #[must_use]
    pub fn aspect_tolerance(mut self, tolerance: f32) -> Self {
        self.config.refiner.aspect_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn feather_unit(mut self, unit: u32) -> Self {
        self.config.refiner.feather_unit = Some(unit);
        self
    }

    #[must_use]
    pub fn sharpness_gain(mut self, gain: f32) -> Self {
        self.config.refiner.sharpness_gain = gain;
        self
    }

    #[must_use]
    pub fn defringe(mut self, enabled: bool) -> Self {
        self.config.compositor.defringe = enabled;
        self
    }

    #[must_use]
    pub fn defringe_radius(mut self, radius: u32) -> Self {
        self.config.compositor.defringe_radius = radius;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn verbose_progress(mut self, verbose: bool) -> Self {
        self.config.verbose_progress = verbose;
        self
    }

    /// Build the session configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when validation fails
    pub fn build(self) -> Result<SessionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.segmentation_timeout(), Duration::from_secs(30));
        assert_eq!(config.output_format, OutputFormat::Png);
        assert!(!config.compositor.defringe);
    }

    #[test]
    fn test_builder_chain() {
        let config = SessionConfig::builder()
            .segmentation_timeout_ms(250)
            .initial_parameter(RefinementParameter::new(-4))
            .feather_unit(3)
            .sharpness_gain(1.5)
            .defringe(true)
            .defringe_radius(3)
            .output_format(OutputFormat::Tiff)
            .build()
            .unwrap();

        assert_eq!(config.segmentation_timeout_ms, 250);
        assert_eq!(config.initial_parameter.value(), -4);
        assert_eq!(config.refiner.feather_unit, Some(3));
        assert!(config.compositor.defringe);
        assert_eq!(config.output_format, OutputFormat::Tiff);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(SessionConfig::builder().aspect_tolerance(1.5).build().is_err());
        assert!(SessionConfig::builder().sharpness_gain(0.0).build().is_err());
        assert!(SessionConfig::builder().feather_unit(0).build().is_err());
        assert!(SessionConfig::builder().defringe_radius(20).build().is_err());

        let err = SessionConfig::builder()
            .segmentation_timeout_ms(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("segmentation timeout"));
    }

    #[test]
    fn test_feather_unit_scales_with_short_edge() {
        let refiner = RefinerConfig::default();
        assert_eq!(refiner.feather_unit_for((64, 64)), 1);
        assert_eq!(refiner.feather_unit_for((512, 512)), 2);
        assert_eq!(refiner.feather_unit_for((4000, 3000)), 12);

        let fixed = RefinerConfig {
            feather_unit: Some(5),
            ..RefinerConfig::default()
        };
        assert_eq!(fixed.feather_unit_for((4000, 3000)), 5);
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "initial_parameter": 14, "compositor": { "defringe": true }, "output_format": "tiff" }"#,
        )
        .unwrap();
        assert_eq!(config.initial_parameter.value(), 10);
        assert!(config.compositor.defringe);
        assert_eq!(config.compositor.defringe_radius, 2);
        assert_eq!(config.output_format, OutputFormat::Tiff);
        assert_eq!(config.segmentation_timeout_ms, 30_000);
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        let err = SessionConfig::from_json_str(r#"{ "refiner": { "sharpness_gain": -1.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));

        let err = SessionConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().contains("Malformed config"));
    }

    #[test]
    fn test_output_format_metadata() {
        assert_eq!(OutputFormat::Png.extension(), "png");
        assert_eq!(OutputFormat::WebP.mime_type(), "image/webp");
        assert_eq!(OutputFormat::Rgba8.to_string(), "rgba");
    }
}
