/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the image size is not valid.
    #[error("Invalid image size ({0}, {1}) mismatch ({2}, {3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when an image has zero width or height.
    #[error("Image size must be non-zero, got ({0}, {1})")]
    EmptyImage(usize, usize),

    /// Error when the pixel type cannot be cast.
    #[error("Failed to cast pixel data to {0}")]
    CastError(String),

    /// Error when the pixel layouts of two buffers are incompatible.
    #[error("Incompatible pixel types")]
    IncompatiblePixelTypes,
}
