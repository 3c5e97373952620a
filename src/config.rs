use burn::config::Config;
use burn::tensor::backend::Backend;

use crate::{FeatureExtractorConfig, GramMatrixMetric, ImageLoaderConfig, StyleError};

/// ImageNet per-channel mean.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet per-channel standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// The first five convolutions, `conv_1` to `conv_5`.
pub fn default_style_layers() -> Vec<String> {
    (1..=5).map(|block| format!("conv_{block}")).collect()
}

/// Configuration for the [Gram matrix style metric](GramMatrixMetric).
///
/// # Example
///
/// ```ignore
/// use gram_style_metric::GramMetricConfig;
///
/// let metric = GramMetricConfig::new().init::<B>(&device)?;
/// let score = metric.compute_score("reference.png", &["render_0.png", "render_1.png"])?;
/// ```
#[derive(Config, Debug)]
pub struct GramMetricConfig {
    /// Names of the layers to measure style at, e.g. `conv_1` or `relu_3`.
    #[config(default = "default_style_layers()")]
    pub style_layers: Vec<String>,
    /// Per-channel mean subtracted from input images.
    #[config(default = "IMAGENET_MEAN")]
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation input images are divided by.
    #[config(default = "IMAGENET_STD")]
    pub normalization_std: [f32; 3],
    /// Image loading.
    #[config(default = "ImageLoaderConfig::new()")]
    pub image: ImageLoaderConfig,
    /// Feature extractor layout.
    #[config(default = "FeatureExtractorConfig::vgg19()")]
    pub extractor: FeatureExtractorConfig,
}

impl GramMetricConfig {
    /// Initialize a new metric with a freshly initialized extractor.
    ///
    /// The extractor weights are random until a record is loaded, see
    /// [GramMatrixMetric::load_weights].
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<GramMatrixMetric<B>, StyleError> {
        let extractor = self.extractor.init(device)?;
        Ok(GramMatrixMetric::with_extractor(self.clone(), extractor, device))
    }
}
