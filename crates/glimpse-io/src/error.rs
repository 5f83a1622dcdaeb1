/// An error type for the io module.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    /// Error reading the encoded buffer.
    #[error("Failed to read the image buffer. {0}")]
    FileError(#[from] std::io::Error),

    /// Error when the encoded buffer holds no data.
    #[error("Image buffer is empty")]
    EmptyBuffer,

    /// Error to create the image.
    #[error("Failed to create image. {0}")]
    ImageCreationError(#[from] glimpse_image::ImageError),

    /// Error to decode the image.
    #[error("Failed to decode the image. {0}")]
    ImageDecodeError(#[from] image::ImageError),
}
