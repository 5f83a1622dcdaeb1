//! Mean/std normalization of image pixel values.
//!
//! Pretrained networks expect inputs standardized per channel with the
//! statistics of their training set:
//!
//! ```text
//! normalized = (pixel - μ) / σ
//! ```

use num_traits::Float;

use glimpse_image::{Image, ImageError};

use crate::parallel;

/// Normalize an image using per-channel mean and standard deviation.
///
/// # Arguments
///
/// * `src` - The input image with shape (H, W, C).
/// * `dst` - The output normalized image with shape (H, W, C).
/// * `mean` - Array of mean values, one per channel.
/// * `std` - Array of standard deviation values, one per channel.
///
/// # Example
///
/// ```
/// use glimpse_image::{Image, ImageSize};
/// use glimpse_imgproc::normalize::normalize_mean_std;
///
/// let image = Image::<f32, 3>::from_size_val(
///     ImageSize { width: 224, height: 224 },
///     0.5,
/// ).unwrap();
///
/// let mut normalized = Image::<f32, 3>::from_size_val(image.size(), 0.0).unwrap();
///
/// let mean = [0.485, 0.456, 0.406];
/// let std = [0.229, 0.224, 0.225];
///
/// normalize_mean_std(&image, &mut normalized, &mean, &std).unwrap();
/// ```
///
/// # Errors
///
/// Returns [`ImageError::InvalidImageSize`] if `src` and `dst` have different dimensions.
pub fn normalize_mean_std<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    mean: &[T; C],
    std: &[T; C],
) -> Result<(), ImageError>
where
    T: Send + Sync + Float,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        src_pixel
            .iter()
            .zip(dst_pixel.iter_mut())
            .zip(mean.iter())
            .zip(std.iter())
            .for_each(|(((&src_val, dst_val), &mean_val), &std_val)| {
                *dst_val = (src_val - mean_val) / std_val;
            });
    });

    Ok(())
}
