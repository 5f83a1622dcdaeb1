use glimpse_image::{Image, ImageSize};

use crate::error::IoError;

/// Decodes an encoded image held in memory into an RGB8 image.
///
/// The format is guessed from the buffer contents. Grayscale, alpha and
/// 16-bit inputs are converted to 8-bit RGB; the alpha channel is dropped.
///
/// # Arguments
///
/// * `bytes` - The encoded image data.
///
/// # Returns
///
/// An image with shape (H, W, 3).
pub fn decode_image_rgb8(bytes: &[u8]) -> Result<Image<u8, 3>, IoError> {
    if bytes.is_empty() {
        return Err(IoError::EmptyBuffer);
    }

    let img = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    Ok(Image::new(size, img.into_rgb8().into_raw())?)
}
