//! Mask refinement: probability map to full-resolution alpha
//!
//! The refiner resamples a (usually lower resolution) foreground probability
//! map to the source image size, shapes its edge according to a
//! [`RefinementParameter`] and quantises the result to an [`AlphaChannel`].
//!
//! - negative parameters feather the edge with a box kernel whose radius grows
//!   with `|parameter|`
//! - positive parameters steepen the map around 0.5 with a normalised logistic
//! - zero passes the resampled map through unchanged
//!
//! Every step is monotonic and deterministic, so the alpha never decreases
//! where the probability increases and identical inputs give identical bytes.

use crate::{
    config::RefinerConfig,
    error::Result,
    types::{AlphaChannel, ProbabilityMap, RefinementParameter},
    utils::{box_blur, resize_bilinear, NumericValidator, Steepening},
};
use ndarray::Array2;
use tracing::{debug, instrument};

/// Turns probability maps into alpha channels
#[derive(Debug, Clone, Default)]
pub struct MaskRefiner {
    config: RefinerConfig,
}

impl MaskRefiner {
    #[must_use]
    pub fn new(config: RefinerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Refine `map` into an alpha channel of `target` size
    ///
    /// # Errors
    /// - `MaskShape` for a zero-area map or target, or an aspect ratio outside
    ///   the configured tolerance
    #[instrument(
        skip_all,
        fields(
            map = %format!("{}x{}", map.width(), map.height()),
            target = %format!("{}x{}", target.0, target.1),
            parameter = %parameter
        )
    )]
    pub fn refine(
        &self,
        map: &ProbabilityMap,
        parameter: RefinementParameter,
        target: (u32, u32),
    ) -> Result<AlphaChannel> {
        let upsampled = self.upsample(map, target)?;
        self.refine_upsampled(&upsampled, parameter)
    }

    /// Resample `map` to `target` after checking its geometry
    ///
    /// The result only depends on the map and the target size, so callers that
    /// re-render with several parameters can compute it once.
    ///
    /// # Errors
    /// - `MaskShape` as for [`MaskRefiner::refine`]
    pub fn upsample(&self, map: &ProbabilityMap, target: (u32, u32)) -> Result<ProbabilityMap> {
        NumericValidator::validate_aspect_ratio(
            map.dimensions(),
            target,
            self.config.aspect_tolerance,
        )?;

        if map.dimensions() == target {
            return Ok(map.clone());
        }

        debug!(
            from = %format!("{}x{}", map.width(), map.height()),
            to = %format!("{}x{}", target.0, target.1),
            "Upsampling probability map"
        );
        Ok(ProbabilityMap::from_clamped(resize_bilinear(
            map.as_array(),
            target.0,
            target.1,
        )?))
    }

    /// Shape and quantise a map that already matches the target resolution
    ///
    /// # Errors
    /// - `MaskShape` for a zero-area map
    pub fn refine_upsampled(
        &self,
        upsampled: &ProbabilityMap,
        parameter: RefinementParameter,
    ) -> Result<AlphaChannel> {
        NumericValidator::validate_non_empty(upsampled.dimensions(), "probability map")?;

        let shaped = self.shape_edges(upsampled, parameter);
        let data = shaped.iter().map(|&v| to_alpha(v)).collect();
        AlphaChannel::new(data, upsampled.dimensions())
    }

    /// Apply the parameter's edge operation to a resolution-matched map
    fn shape_edges(&self, map: &ProbabilityMap, parameter: RefinementParameter) -> Array2<f32> {
        if let Some(softness) = parameter.softness() {
            let radius = self.feather_radius(map.dimensions(), softness);
            debug!(radius, "Feathering edge");
            box_blur(map.as_array(), radius as usize)
        } else if let Some(sharpness) = parameter.sharpness() {
            let gain = sharpness as f32 * self.config.sharpness_gain;
            debug!(gain, "Steepening edge");
            Steepening::new(gain).apply_grid(map.as_array())
        } else {
            map.as_array().clone()
        }
    }

    /// Box radius in pixels for a softness step count
    #[must_use]
    pub fn feather_radius(&self, dimensions: (u32, u32), softness: u32) -> u32 {
        softness * self.config.feather_unit_for(dimensions)
    }
}

/// Quantise a probability to alpha with round-to-nearest
fn to_alpha(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BgRemovalError;

    fn square_map(size: u32, inner: u32) -> ProbabilityMap {
        let lo = (size - inner) / 2;
        let hi = lo + inner;
        ProbabilityMap::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                1.0
            } else {
                0.0
            }
        })
    }

    fn band(alpha: &AlphaChannel) -> usize {
        alpha.statistics().transition_pixels
    }

    #[test]
    fn test_neutral_same_size_is_exact() {
        let refiner = MaskRefiner::default();
        let map = ProbabilityMap::new(2, 2, vec![0.0, 0.5, 1.0, 0.2]).unwrap();
        let alpha = refiner.refine(&map, RefinementParameter::NEUTRAL, (2, 2)).unwrap();
        assert_eq!(alpha.data(), &[0, 128, 255, 51]);
    }

    #[test]
    fn test_refine_is_deterministic() {
        let refiner = MaskRefiner::default();
        let map = ProbabilityMap::from_fn(24, 18, |x, y| ((x * 7 + y * 3) % 11) as f32 / 10.0);
        for parameter in [-6, 0, 6] {
            let parameter = RefinementParameter::new(parameter);
            let a = refiner.refine(&map, parameter, (96, 72)).unwrap();
            let b = refiner.refine(&map, parameter, (96, 72)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_output_matches_target_size() {
        let refiner = MaskRefiner::default();
        let map = square_map(32, 16);
        let alpha = refiner.refine(&map, RefinementParameter::new(-2), (128, 128)).unwrap();
        assert_eq!(alpha.dimensions(), (128, 128));
        assert_eq!(alpha.data().len(), 128 * 128);
    }

    #[test]
    fn test_softness_widens_band() {
        let refiner = MaskRefiner::default();
        let map = square_map(64, 32);
        let neutral = refiner.refine(&map, RefinementParameter::NEUTRAL, (64, 64)).unwrap();
        let soft = refiner.refine(&map, RefinementParameter::new(-1), (64, 64)).unwrap();
        let softer = refiner.refine(&map, RefinementParameter::new(-3), (64, 64)).unwrap();
        assert_eq!(band(&neutral), 0);
        assert!(band(&soft) > band(&neutral));
        assert!(band(&softer) > band(&soft));
    }

    #[test]
    fn test_sharpness_never_widens_band() {
        let refiner = MaskRefiner::default();
        let map = square_map(16, 8);
        let neutral = refiner.refine(&map, RefinementParameter::NEUTRAL, (64, 64)).unwrap();
        let sharp = refiner.refine(&map, RefinementParameter::new(5), (64, 64)).unwrap();
        assert!(band(&neutral) > 0);
        assert!(band(&sharp) <= band(&neutral));
    }

    #[test]
    fn test_rejects_zero_area_map() {
        let refiner = MaskRefiner::default();
        let map = ProbabilityMap::new(0, 4, Vec::new()).unwrap();
        let err = refiner
            .refine(&map, RefinementParameter::NEUTRAL, (16, 16))
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::MaskShape(_)));
    }

    #[test]
    fn test_rejects_mismatched_aspect_ratio() {
        let refiner = MaskRefiner::default();
        let map = ProbabilityMap::from_fn(30, 40, |_, _| 0.5);
        let err = refiner
            .refine(&map, RefinementParameter::NEUTRAL, (400, 300))
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::MaskShape(_)));
    }

    #[test]
    fn test_feather_radius_uses_configured_unit() {
        let refiner = MaskRefiner::new(RefinerConfig {
            feather_unit: Some(3),
            ..RefinerConfig::default()
        });
        assert_eq!(refiner.feather_radius((100, 100), 4), 12);
        assert_eq!(MaskRefiner::default().feather_radius((1024, 768), 10), 30);
    }
}
