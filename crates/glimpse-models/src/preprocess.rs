use candle_core::{Device, Tensor};
use glimpse_image::{ops, Image, ImageSize};
use glimpse_imgproc::{normalize::normalize_mean_std, resize::resize_fast};

use crate::error::ModelError;

/// Side of the square network input.
pub const INPUT_SIZE: usize = 224;

/// ImageNet statistics the backbones were trained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Transform an RGB8 image into the network input tensor.
///
/// The image is resized to 224x224 with bilinear resampling, scaled to [0, 1] and
/// normalized per channel with the ImageNet statistics. Every call allocates its own
/// buffers, so the function can run concurrently on shared models.
///
/// # Arguments
///
/// * `image` - The rgb8 image with shape [H, W, 3].
/// * `device` - The device the tensor is created on.
///
/// # Returns
///
/// A f32 tensor with shape [1, 3, 224, 224].
pub fn preprocess(image: &Image<u8, 3>, device: &Device) -> Result<Tensor, ModelError> {
    let new_size = ImageSize {
        width: INPUT_SIZE,
        height: INPUT_SIZE,
    };

    // resize image to 224x224
    let mut resized = Image::<u8, 3>::from_size_val(new_size, 0)?;
    resize_fast(image, &mut resized)?;

    // cast the image to f32 and scale it to the range [0, 1]
    let mut resized_f32 = Image::<f32, 3>::from_size_val(new_size, 0.0)?;
    ops::cast_and_scale(&resized, &mut resized_f32, 1.0 / 255.0)?;

    let mut normalized = Image::<f32, 3>::from_size_val(new_size, 0.0)?;
    normalize_mean_std(&resized_f32, &mut normalized, &IMAGENET_MEAN, &IMAGENET_STD)?;

    // permute the image to the shape (1, c, h, w)
    let image_t = Tensor::from_vec(normalized.into_vec(), (INPUT_SIZE, INPUT_SIZE, 3), device)?
        .permute((2, 0, 1))?
        .contiguous()?
        .unsqueeze(0)?;

    Ok(image_t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::IndexOp;

    fn gradient_image(width: usize, height: usize) -> Image<u8, 3> {
        let data = (0..width * height * 3)
            .map(|i| ((i * 7) % 256) as u8)
            .collect();
        Image::new([width, height].into(), data).expect("valid image")
    }

    #[test]
    fn output_shape() -> Result<(), ModelError> {
        let image = gradient_image(64, 48);
        let image_t = preprocess(&image, &Device::Cpu)?;
        assert_eq!(image_t.dims(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
        Ok(())
    }

    #[test]
    fn output_is_bounded() -> Result<(), ModelError> {
        let image = gradient_image(301, 157);
        let values = preprocess(&image, &Device::Cpu)?
            .flatten_all()?
            .to_vec1::<f32>()?;

        let lower = (0.0 - 0.485) / 0.229 - 1e-5;
        let upper = (1.0 - 0.406) / 0.225 + 1e-5;
        assert!(values.iter().all(|v| (lower..=upper).contains(v)));
        Ok(())
    }

    #[test]
    fn output_is_reproducible() -> Result<(), ModelError> {
        let image = gradient_image(97, 211);
        let first = preprocess(&image, &Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?;
        let second = preprocess(&image, &Device::Cpu)?.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn white_image_channel_values() -> Result<(), ModelError> {
        let image = Image::<u8, 3>::from_size_val([10, 10].into(), 255)?;
        let image_t = preprocess(&image, &Device::Cpu)?;

        for c in 0..3 {
            let v = image_t.i((0, c, 100, 100))?.to_scalar::<f32>()?;
            assert_relative_eq!(v, (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c], epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn empty_image_fails() {
        let image = Image::<u8, 3>::new([0, 0].into(), vec![]).expect("empty image");
        assert!(matches!(
            preprocess(&image, &Device::Cpu),
            Err(ModelError::ImageError(_))
        ));
    }
}
