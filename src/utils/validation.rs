//! Numeric and geometry validation utilities
//!
//! Range checks shared by configuration validation and by the refiner's
//! mask geometry checks.

use crate::error::{BgRemovalError, Result};

/// Validator for numeric values and mask geometry
pub struct NumericValidator;

impl NumericValidator {
    /// Validate fraction value (0.0 to 1.0)
    pub fn validate_fraction(value: f32, name: &str) -> Result<f32> {
        if !value.is_finite() {
            return Err(BgRemovalError::invalid_config(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if !(0.0..=1.0).contains(&value) {
            return Err(BgRemovalError::config_value_error(
                name,
                value,
                "0.0-1.0",
                None,
            ));
        }

        Ok(value)
    }

    /// Validate numeric range (inclusive)
    pub fn validate_range<T>(value: T, min: T, max: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            return Err(BgRemovalError::invalid_config(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, value
            )));
        }
        Ok(value)
    }

    /// Validate that a float is finite and strictly positive
    pub fn validate_positive_finite(value: f32, name: &str) -> Result<f32> {
        if !value.is_finite() || value <= 0.0 {
            return Err(BgRemovalError::invalid_config(format!(
                "{} must be a positive finite number, got {}",
                name, value
            )));
        }
        Ok(value)
    }

    /// Reject zero-area geometry
    pub fn validate_non_empty(dimensions: (u32, u32), what: &str) -> Result<()> {
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(BgRemovalError::mask_shape(format!(
                "{} has zero area ({}x{})",
                what, dimensions.0, dimensions.1
            )));
        }
        Ok(())
    }

    /// Check that `map` has the aspect ratio of `target` within a relative tolerance
    ///
    /// A 160x120 map passes for a 4000x3000 target; a 120x160 map does not.
    pub fn validate_aspect_ratio(map: (u32, u32), target: (u32, u32), tolerance: f32) -> Result<()> {
        Self::validate_non_empty(map, "probability map")?;
        Self::validate_non_empty(target, "target image")?;

        let map_ratio = f64::from(map.0) / f64::from(map.1);
        let target_ratio = f64::from(target.0) / f64::from(target.1);
        let deviation = (map_ratio - target_ratio).abs() / target_ratio;

        if deviation > f64::from(tolerance) {
            return Err(BgRemovalError::mask_shape(format!(
                "probability map {}x{} (aspect {:.4}) does not match image {}x{} (aspect {:.4}); \
                 relative deviation {:.4} exceeds tolerance {}",
                map.0, map.1, map_ratio, target.0, target.1, target_ratio, deviation, tolerance
            )));
        }
        Ok(())
    }
}
