//! Gram matrix style metric.
//!
//! Scores how far the style of rendered images is from a reference image, following the
//! Gram-matrix style loss of Gatys et al. A score of 0 means every tapped layer has the same
//! channel correlations as the reference.
//!
//! Reference: "A Neural Algorithm of Artistic Style" <https://arxiv.org/abs/1508.06576>

use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use burn::tensor::cast::ToElement;
use burn::tensor::Tensor;

use crate::model::{Normalization, TruncatedModel};
use crate::planner::TapPlan;
use crate::{FeatureExtractor, GramMetricConfig, ImageLoader, StyleError};

/// Metric comparing a reference image with a set of rendered images.
pub trait ImageMetric {
    /// The name of the metric.
    const NAME: &'static str;

    /// Score `rendered` against `reference`, averaged over the rendered images.
    fn compute_score<P: AsRef<Path>>(
        &self,
        reference: &Path,
        rendered: &[P],
    ) -> Result<f64, StyleError>;
}

/// Per-image style deviations and their mean.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleScore {
    /// Summed probe deviation of each rendered image, in input order.
    pub per_image: Vec<f64>,
    /// Arithmetic mean of `per_image`.
    pub mean: f64,
}

/// Gram matrix style similarity metric.
///
/// Holds the feature extractor, which is never modified. Each scoring call builds its own
/// [truncated model](TruncatedModel) and probes, then evaluates rendered images one at a time.
#[derive(Debug)]
pub struct GramMatrixMetric<B: Backend> {
    config: GramMetricConfig,
    extractor: FeatureExtractor<B>,
    loader: ImageLoader,
    device: B::Device,
}

impl<B: Backend> GramMatrixMetric<B> {
    /// Create the metric around an existing, usually pretrained, extractor.
    pub fn with_extractor(
        config: GramMetricConfig,
        extractor: FeatureExtractor<B>,
        device: &B::Device,
    ) -> Self {
        let loader = config.image.init();

        Self {
            config,
            extractor,
            loader,
            device: device.clone(),
        }
    }

    /// Load extractor weights saved with the named MessagePack recorder.
    pub fn load_weights<P: AsRef<Path>>(mut self, path: P) -> Result<Self, StyleError> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        log::info!("Loading extractor weights from {}", path.as_ref().display());

        self.extractor = self
            .extractor
            .load_file(path.as_ref().to_path_buf(), &recorder, &self.device)?;
        Ok(self)
    }

    /// The metric configuration.
    pub fn config(&self) -> &GramMetricConfig {
        &self.config
    }

    /// The feature extractor.
    pub fn extractor(&self) -> &FeatureExtractor<B> {
        &self.extractor
    }

    /// Plan the probes requested by the configuration.
    pub fn plan(&self) -> TapPlan {
        let plan = TapPlan::new(&self.extractor.kinds(), &self.config.style_layers);

        if plan.num_probes() < self.config.style_layers.len() {
            log::warn!(
                "Only {} of {} style layers found in the extractor",
                plan.num_probes(),
                self.config.style_layers.len()
            );
        }

        plan
    }

    /// Score images loaded from disk.
    pub fn compute_score<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        reference: P,
        rendered: &[Q],
    ) -> Result<f64, StyleError> {
        if rendered.is_empty() {
            return Err(StyleError::NoRenderedImages);
        }

        let reference = self.loader.load::<B, _>(reference, &self.device)?;
        let rendered = rendered
            .iter()
            .map(|path| self.loader.load::<B, _>(path, &self.device));

        self.score_with(reference, rendered).map(|score| score.mean)
    }

    /// Score already loaded `[1, 3, height, width]` images with values in `[0, 1]`.
    pub fn score_tensors(
        &self,
        reference: Tensor<B, 4>,
        rendered: Vec<Tensor<B, 4>>,
    ) -> Result<f64, StyleError> {
        self.score_tensors_detailed(reference, rendered)
            .map(|score| score.mean)
    }

    /// Like [score_tensors](Self::score_tensors), keeping every per-image deviation.
    pub fn score_tensors_detailed(
        &self,
        reference: Tensor<B, 4>,
        rendered: Vec<Tensor<B, 4>>,
    ) -> Result<StyleScore, StyleError> {
        if rendered.is_empty() {
            return Err(StyleError::NoRenderedImages);
        }

        self.score_with(reference, rendered.into_iter().map(Ok))
    }

    fn score_with<I>(&self, reference: Tensor<B, 4>, rendered: I) -> Result<StyleScore, StyleError>
    where
        I: IntoIterator<Item = Result<Tensor<B, 4>, StyleError>>,
    {
        check_batch(&reference)?;

        let plan = self.plan();
        let normalization = Normalization::new(
            self.config.normalization_mean,
            self.config.normalization_std,
            &self.device,
        );
        let mut model = TruncatedModel::build(&self.extractor, normalization, &plan, reference);

        let mut per_image = Vec::new();
        for image in rendered {
            let image = image?;
            check_batch(&image)?;

            let deviation = model.style_deviation(image).into_scalar().to_f64();
            log::debug!("Rendered image {}: style deviation {deviation}", per_image.len());
            per_image.push(deviation);
        }

        if per_image.is_empty() {
            return Err(StyleError::NoRenderedImages);
        }

        let mean = per_image.iter().sum::<f64>() / per_image.len() as f64;
        log::info!("Gram style score over {} images: {mean}", per_image.len());

        Ok(StyleScore { per_image, mean })
    }
}

impl<B: Backend> ImageMetric for GramMatrixMetric<B> {
    const NAME: &'static str = "Gram Matrix Style";

    fn compute_score<P: AsRef<Path>>(
        &self,
        reference: &Path,
        rendered: &[P],
    ) -> Result<f64, StyleError> {
        GramMatrixMetric::compute_score(self, reference, rendered)
    }
}

fn check_batch<B: Backend>(image: &Tensor<B, 4>) -> Result<(), StyleError> {
    match image.dims()[0] {
        1 => Ok(()),
        batch => Err(StyleError::BatchSize(batch)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeatureExtractorConfig, LayerKind, TestBackend};
    use burn::tensor::Distribution;
    use LayerKind::*;

    fn metric(style_layers: &[&str]) -> GramMatrixMetric<TestBackend> {
        let kinds = [
            Convolution,
            Activation,
            Pooling,
            Convolution,
            Activation,
            Pooling,
            Convolution,
            Activation,
        ];
        GramMetricConfig::new()
            .with_style_layers(style_layers.iter().map(|s| s.to_string()).collect())
            .with_extractor(FeatureExtractorConfig::from_kinds(&kinds, 6))
            .init(&Default::default())
            .unwrap()
    }

    fn image() -> Tensor<TestBackend, 4> {
        Tensor::random([1, 3, 16, 16], Distribution::Default, &Default::default())
    }

    #[test]
    fn identical_image_scores_zero() {
        let metric = metric(&["conv_1", "conv_2", "conv_3"]);
        let reference = image();

        let score = metric
            .score_tensors(reference.clone(), vec![reference])
            .unwrap();

        assert!(score.abs() < 1e-6, "score was {score}");
    }

    #[test]
    fn batch_score_is_mean_of_single_scores() {
        let metric = metric(&["conv_1", "conv_2", "conv_3"]);
        let (reference, a, b) = (image(), image(), image());

        let score_a = metric.score_tensors(reference.clone(), vec![a.clone()]).unwrap();
        let score_b = metric.score_tensors(reference.clone(), vec![b.clone()]).unwrap();
        let score_ab = metric.score_tensors(reference, vec![a, b]).unwrap();

        let expected = (score_a + score_b) / 2.0;
        assert!(
            (score_ab - expected).abs() <= 1e-5 * expected.abs().max(1e-6),
            "{score_ab} != {expected}"
        );
    }

    #[test]
    fn detailed_score_keeps_order() {
        let metric = metric(&["conv_1", "conv_2"]);
        let reference = image();

        let score = metric
            .score_tensors_detailed(reference.clone(), vec![image(), reference])
            .unwrap();

        assert_eq!(score.per_image.len(), 2);
        assert!(score.per_image[0] > 0.0);
        assert!(score.per_image[1].abs() < 1e-6);
        assert!((score.mean - score.per_image[0] / 2.0).abs() < 1e-6 * score.per_image[0]);
    }

    #[test]
    fn empty_rendered_list_is_an_error() {
        let metric = metric(&["conv_1"]);

        let result = metric.score_tensors(image(), Vec::new());

        assert!(matches!(result, Err(StyleError::NoRenderedImages)));
    }

    #[test]
    fn batched_input_is_an_error() {
        let metric = metric(&["conv_1"]);
        let batch = Tensor::random([2, 3, 16, 16], Distribution::Default, &Default::default());

        let result = metric.score_tensors(image(), vec![batch]);

        assert!(matches!(result, Err(StyleError::BatchSize(2))));
    }

    #[test]
    fn unknown_style_layer_is_silently_dropped() {
        let full = metric(&["conv_1", "conv_2"]);
        let partial = metric(&["conv_1", "conv_2", "conv_99"]);

        assert_eq!(full.plan().num_probes(), 2);
        assert_eq!(partial.plan().num_probes(), 2);

        let reference = image();
        let score = partial
            .score_tensors(reference.clone(), vec![image()])
            .unwrap();
        assert!(score.is_finite());
    }

    #[test]
    fn default_layers_on_vgg_layout() {
        let config = GramMetricConfig::new();
        let kinds = config
            .extractor
            .layers
            .iter()
            .map(|spec| spec.kind.parse::<LayerKind>().unwrap())
            .collect::<Vec<_>>();

        let plan = TapPlan::new(&kinds, &config.style_layers);

        assert_eq!(plan.num_probes(), 5);
        // conv_5 opens the third stage: four convolutions with their activations and two
        // poolings come before it.
        assert_eq!(plan.layers().len(), 4 * 2 + 2 + 1);
    }
}
