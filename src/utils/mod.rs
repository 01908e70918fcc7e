//! Shared utilities for resampling, edge kernels and validation

pub mod kernel;
pub mod resample;
pub mod validation;

pub use kernel::{box_blur, Steepening};
pub use resample::{bilinear_support, resize_bilinear};
pub use validation::NumericValidator;
