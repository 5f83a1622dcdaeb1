use fast_image_resize as fr;
use glimpse_image::{Image, ImageError};

/// Bilinear resize using the [fast_image_resize](https://crates.io/crates/fast_image_resize) crate.
///
/// The function resizes an image to the size of `dst`. It supports only 3-channel images and
/// u8 data type. The resize runs a convolution with a bilinear (triangle) kernel, so
/// downscaling is anti-aliased.
///
/// # Arguments
///
/// * `src` - The input image container with 3 channels.
/// * `dst` - The output image container, already allocated with the target size.
///
/// # Example
///
/// ```
/// use glimpse_image::{Image, ImageSize};
/// use glimpse_imgproc::resize::resize_fast;
///
/// let image = Image::<_, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0u8; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let new_size = ImageSize {
///     width: 2,
///     height: 3,
/// };
///
/// let mut image_resized = Image::<_, 3>::from_size_val(new_size, 0).unwrap();
///
/// resize_fast(&image, &mut image_resized).unwrap();
///
/// assert_eq!(image_resized.size().width, 2);
/// assert_eq!(image_resized.size().height, 3);
/// ```
///
/// # Errors
///
/// The function returns an error if either image is empty or the buffers cannot be wrapped.
pub fn resize_fast(
    src: &Image<u8, 3>,
    dst: &mut Image<u8, 3>,
) -> Result<(), ImageError> {
    if src.width() == 0 || src.height() == 0 {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    if dst.width() == 0 || dst.height() == 0 {
        return Err(ImageError::EmptyImage(dst.width(), dst.height()));
    }

    let src_len = src.as_slice().len();
    let src_image = fr::images::ImageRef::new(
        src.width() as u32,
        src.height() as u32,
        src.as_slice(),
        fr::PixelType::U8x3,
    )
    .map_err(|_| ImageError::InvalidChannelShape(src_len, src.width() * src.height() * 3))?;

    let (dst_width, dst_height) = (dst.width() as u32, dst.height() as u32);
    let dst_len = dst.as_slice().len();
    let mut dst_image = fr::images::Image::from_slice_u8(
        dst_width,
        dst_height,
        dst.as_slice_mut(),
        fr::PixelType::U8x3,
    )
    .map_err(|_| ImageError::InvalidChannelShape(dst_len, dst_len))?;

    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));

    fr::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|_| ImageError::IncompatiblePixelTypes)?;

    Ok(())
}
