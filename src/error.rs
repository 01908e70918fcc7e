//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Coarse error taxonomy exposed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    Segmentation,
    MaskShape,
    DimensionMismatch,
    Cancelled,
    InvalidConfig,
    InvalidState,
    Io,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnsupportedFormat => "unsupported_format",
            Self::Segmentation => "segmentation",
            Self::MaskShape => "mask_shape",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid_config",
            Self::InvalidState => "invalid_state",
            Self::Io => "io",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Comprehensive error types for background removal operations
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input is not an image, or the image bytes could not be decoded
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The segmentation capability failed or timed out
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Probability map geometry is incompatible with the target image
    #[error("Mask shape error: {0}")]
    MaskShape(String),

    /// Pixel buffer and alpha channel disagree on dimensions
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Request was superseded by a newer one
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation is not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding errors from the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new mask shape error
    pub fn mask_shape<S: Into<String>>(msg: S) -> Self {
        Self::MaskShape(msg.into())
    }

    /// Create a new dimension mismatch error
    pub fn dimension_mismatch<S: Into<String>>(msg: S) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    // Enhanced contextual error creators

    /// Create a dimension mismatch error from two `(width, height)` pairs
    #[must_use]
    pub fn dimensions_differ(what: &str, expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch(format!(
            "{} is {}x{} but the source image is {}x{}",
            what, actual.0, actual.1, expected.0, expected.1
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn stage_error(stage: &str, details: &str) -> Self {
        Self::Internal(format!("Processing failed at stage '{}': {}", stage, details))
    }

    /// Taxonomy kind of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Segmentation(_) => ErrorKind::Segmentation,
            Self::MaskShape(_) => ErrorKind::MaskShape,
            Self::DimensionMismatch(_) => ErrorKind::DimensionMismatch,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Io(_) => ErrorKind::Io,
            Self::Image(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error only signals that a newer request won
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
