//! Resampling of probability grids
//!
//! Grids are resized as `f32` luma images with the `image` crate's triangle
//! (bilinear) filter. Upsampling reads the source at pixel centres and
//! clamps at the edges; every output is a convex combination of source
//! cells, so the result stays in the input range and is monotonic in every
//! input cell.

use crate::error::{BgRemovalError, Result};
use image::{imageops, ImageBuffer, Luma};
use ndarray::Array2;

/// Resize a `(rows, cols)` grid to `(height, width)` with bilinear filtering
///
/// Returns a copy when the size already matches. Callers must not pass an
/// empty grid.
///
/// # Errors
/// - `Internal` if the grid cannot be viewed as an image
pub fn resize_bilinear(src: &Array2<f32>, width: u32, height: u32) -> Result<Array2<f32>> {
    let (rows, cols) = src.dim();
    if (rows, cols) == (height as usize, width as usize) {
        return Ok(src.clone());
    }

    let grid: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, src.iter().copied().collect())
            .ok_or_else(|| BgRemovalError::internal("probability grid does not fit its shape"))?;
    let resized = imageops::resize(&grid, width, height, imageops::FilterType::Triangle);

    Array2::from_shape_vec((height as usize, width as usize), resized.into_raw())
        .map_err(|e| BgRemovalError::internal(format!("resized grid has wrong shape: {}", e)))
}

/// Width, in target pixels, of the band a single source step can spread over
///
/// A hard step between two source cells becomes a ramp across at most this
/// many target pixels per axis.
#[must_use]
pub fn bilinear_support(src_len: u32, dst_len: u32) -> u32 {
    if src_len == 0 || dst_len <= src_len {
        return 1;
    }
    (f64::from(dst_len) / f64::from(src_len)).ceil() as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_size_is_identity() {
        let src = Array2::from_shape_fn((3, 4), |(y, x)| (x + y) as f32 / 10.0);
        assert_eq!(resize_bilinear(&src, 4, 3).unwrap(), src);
    }

    #[test]
    fn test_constant_grid_stays_constant() {
        let src = Array2::from_elem((4, 4), 0.7_f32);
        let out = resize_bilinear(&src, 16, 16).unwrap();
        assert!(out.iter().all(|&v| (v - 0.7).abs() < 1e-5));
    }

    #[test]
    fn test_upsampled_step_is_monotonic_ramp() {
        let src = Array2::from_shape_fn((1, 2), |(_, x)| x as f32);
        let out = resize_bilinear(&src, 8, 1).unwrap();
        let row: Vec<f32> = out.row(0).to_vec();
        assert_eq!(row[0], 0.0);
        assert_eq!(row[7], 1.0);
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_step_ramp_fits_inside_support() {
        let src = Array2::from_shape_fn((1, 8), |(_, x)| if x < 4 { 0.0 } else { 1.0 });
        let out = resize_bilinear(&src, 32, 1).unwrap();
        let partial = out.iter().filter(|&&v| v > 0.0 && v < 1.0).count() as u32;
        assert!(partial <= bilinear_support(8, 32));
    }

    #[test]
    fn test_output_stays_in_unit_range() {
        let src = Array2::from_shape_fn((5, 7), |(y, x)| if (x + y) % 2 == 0 { 1.0 } else { 0.0 });
        let out = resize_bilinear(&src, 23, 17).unwrap();
        assert_eq!(out.dim(), (17, 23));
        assert!(out.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_downsampling_averages_neighbours() {
        let src = Array2::from_shape_fn((2, 2), |(y, x)| if x == y { 1.0 } else { 0.0 });
        let out = resize_bilinear(&src, 1, 1).unwrap();
        assert!((out[[0, 0]] - 0.5).abs() < 1e-6);
    }
}
