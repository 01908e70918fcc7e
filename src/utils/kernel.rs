//! Edge-shaping kernels for probability grids

use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};

/// Separable box blur with clamp-to-edge sampling
///
/// Each output is the mean of the `(2r+1)²` window around it. Weights are
/// non-negative, so the blur is monotonic in its input. Radius 0 returns a
/// copy.
#[must_use]
pub fn box_blur(src: &Array2<f32>, radius: usize) -> Array2<f32> {
    if radius == 0 || src.is_empty() {
        return src.clone();
    }

    let mut horizontal = src.clone();
    for mut row in horizontal.axis_iter_mut(Axis(0)) {
        let input = row.to_owned();
        blur_line(input.view(), row.view_mut(), radius);
    }

    let mut out = horizontal.clone();
    for (mut column, input) in out
        .axis_iter_mut(Axis(1))
        .zip(horizontal.axis_iter(Axis(1)))
    {
        blur_line(input, column.view_mut(), radius);
    }
    out
}

/// 1-D box filter over a line using a prefix sum of the edge-clamped input
#[allow(clippy::indexing_slicing)]
// Safe: prefix has len + 2r + 1 entries and i + 2r + 1 <= len + 2r
fn blur_line(input: ArrayView1<'_, f32>, mut output: ArrayViewMut1<'_, f32>, radius: usize) {
    let len = input.len();
    if len == 0 {
        return;
    }
    let last = len - 1;
    let window = 2 * radius + 1;

    let mut prefix = Vec::with_capacity(len + window);
    prefix.push(0.0_f64);
    let mut acc = 0.0_f64;
    for k in 0..len + 2 * radius {
        let src_index = k.saturating_sub(radius).min(last);
        acc += f64::from(input[src_index]);
        prefix.push(acc);
    }

    for (i, out) in output.iter_mut().enumerate() {
        let sum = prefix[i + window] - prefix[i];
        *out = ((sum / window as f64) as f32).clamp(0.0, 1.0);
    }
}

/// Normalised logistic contrast curve around 0.5
///
/// Maps 0 to 0, 0.5 to 0.5 and 1 to 1; below 0.5 the curve lies under the
/// identity and above 0.5 over it, so values move away from the midpoint and
/// the transition band narrows as the gain grows.
#[derive(Debug, Clone, Copy)]
pub struct Steepening {
    gain: f64,
    floor: f64,
    span: f64,
}

fn logistic(t: f64) -> f64 {
    1.0 / (1.0 + (-t).exp())
}

impl Steepening {
    /// Curve with logistic slope parameter `gain` (must be positive)
    #[must_use]
    pub fn new(gain: f32) -> Self {
        let gain = f64::from(gain.max(f32::EPSILON));
        let floor = logistic(-gain * 0.5);
        let span = logistic(gain * 0.5) - floor;
        Self { gain, floor, span }
    }

    #[must_use]
    pub fn apply(&self, value: f32) -> f32 {
        if value <= 0.0 {
            return 0.0;
        }
        if value >= 1.0 {
            return 1.0;
        }
        let raw = logistic(self.gain * (f64::from(value) - 0.5));
        (((raw - self.floor) / self.span) as f32).clamp(0.0, 1.0)
    }

    /// Apply the curve to every cell
    #[must_use]
    pub fn apply_grid(&self, src: &Array2<f32>) -> Array2<f32> {
        src.mapv(|v| self.apply(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(width: usize) -> Array2<f32> {
        Array2::from_shape_fn((1, width), |(_, x)| if x < width / 2 { 0.0 } else { 1.0 })
    }

    #[test]
    fn test_box_blur_radius_zero_is_identity() {
        let src = step(10);
        assert_eq!(box_blur(&src, 0), src);
    }

    #[test]
    fn test_box_blur_preserves_constant_grid() {
        let src = Array2::from_elem((5, 7), 0.25_f32);
        let out = box_blur(&src, 3);
        assert!(out.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_box_blur_widens_step() {
        let src = step(20);
        let partial = |grid: &Array2<f32>| grid.iter().filter(|&&v| v > 0.0 && v < 1.0).count();
        let narrow = box_blur(&src, 1);
        let wide = box_blur(&src, 3);
        assert_eq!(partial(&narrow), 2);
        assert_eq!(partial(&wide), 6);
    }

    #[test]
    fn test_box_blur_is_symmetric_around_step() {
        let out = box_blur(&step(20), 2);
        for x in 0..10 {
            let left = out[[0, x]];
            let right = out[[0, 19 - x]];
            assert!((left + right - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_steepening_fixed_points() {
        let curve = Steepening::new(20.0);
        assert_eq!(curve.apply(0.0), 0.0);
        assert_eq!(curve.apply(1.0), 1.0);
        assert!((curve.apply(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_steepening_pushes_away_from_midpoint() {
        let curve = Steepening::new(8.0);
        for i in 1..50 {
            let v = i as f32 / 100.0;
            assert!(curve.apply(v) <= v);
            assert!(curve.apply(1.0 - v) >= 1.0 - v);
        }
    }

    #[test]
    fn test_steepening_is_monotonic() {
        let curve = Steepening::new(12.0);
        let values: Vec<f32> = (0..=1000).map(|i| curve.apply(i as f32 / 1000.0)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }
}
