use std::path::Path;

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use image::imageops::FilterType;
use image::DynamicImage;

use crate::StyleError;

/// Configuration to create an [image loader](ImageLoader).
#[derive(Config, Debug)]
pub struct ImageLoaderConfig {
    /// Target length of the shorter image edge, in pixels.
    #[config(default = 128)]
    pub image_size: usize,
}

impl ImageLoaderConfig {
    /// Initialize a new [image loader](ImageLoader).
    pub fn init(&self) -> ImageLoader {
        ImageLoader {
            image_size: self.image_size,
        }
    }
}

/// Decodes image files into `[1, 3, height, width]` tensors with values in `[0, 1]`.
///
/// The shorter edge is resized to `image_size` and the aspect ratio is kept.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    image_size: usize,
}

impl ImageLoader {
    /// Load the image at `path` on `device`.
    pub fn load<B: Backend, P: AsRef<Path>>(
        &self,
        path: P,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, StyleError> {
        let path = path.as_ref();
        log::debug!("Loading image {}", path.display());

        let image = image::open(path)?;
        Ok(self.to_tensor(image, device))
    }

    /// Resize and convert an already decoded image.
    pub fn to_tensor<B: Backend>(&self, image: DynamicImage, device: &B::Device) -> Tensor<B, 4> {
        let (width, height) = self.resized_dims(image.width(), image.height());
        let image = if (width, height) == (image.width(), image.height()) {
            image
        } else {
            image.resize_exact(width, height, FilterType::Triangle)
        };

        let data = image.into_rgb8().into_raw();
        let [height, width] = [height as usize, width as usize];

        Tensor::<B, 3>::from_data(
            TensorData::new(data, Shape::new([height, width, 3])).convert::<B::FloatElem>(),
            device,
        )
        .permute([2, 0, 1]) // [C, H, W]
        .div_scalar(255.0)
        .unsqueeze::<4>() // [1, C, H, W]
    }

    /// Output dimensions for an input of `width` x `height`.
    fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let size = self.image_size as u64;
        let (width, height) = (width as u64, height as u64);

        if width <= height {
            (size as u32, (size * height / width) as u32)
        } else {
            ((size * width / height) as u32, size as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::cast::ToElement;
    use image::{Rgb, RgbImage};

    #[test]
    fn shorter_edge_is_resized() {
        let loader = ImageLoaderConfig::new().with_image_size(64).init();

        assert_eq!(loader.resized_dims(200, 100), (128, 64));
        assert_eq!(loader.resized_dims(100, 300), (64, 192));
        assert_eq!(loader.resized_dims(64, 64), (64, 64));
    }

    #[test]
    fn tensor_layout_and_range() {
        let device = Default::default();
        let loader = ImageLoaderConfig::new().with_image_size(4).init();
        let image = RgbImage::from_pixel(4, 8, Rgb([255, 0, 51]));

        let tensor: Tensor<TestBackend, 4> =
            loader.to_tensor(DynamicImage::ImageRgb8(image), &device);

        assert_eq!(tensor.dims(), [1, 3, 8, 4]);
        let channel_means = tensor
            .mean_dim(3)
            .mean_dim(2)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!((channel_means[0] - 1.0).abs() < 1e-6);
        assert!(channel_means[1].abs() < 1e-6);
        assert!((channel_means[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn missing_file_propagates() {
        let device = Default::default();
        let loader = ImageLoaderConfig::new().init();

        let result = loader.load::<TestBackend, _>("does/not/exist.png", &device);

        assert!(matches!(result, Err(StyleError::Image(_))));
    }

    #[test]
    fn loads_from_disk() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        RgbImage::from_pixel(10, 20, Rgb([128, 128, 128]))
            .save(&path)
            .unwrap();

        let tensor = ImageLoaderConfig::new()
            .with_image_size(5)
            .init()
            .load::<TestBackend, _>(&path, &device)
            .unwrap();

        assert_eq!(tensor.dims(), [1, 3, 10, 5]);
        let value = tensor.max().into_scalar().to_f64();
        assert!((value - 128.0 / 255.0).abs() < 1e-2);
    }
}
