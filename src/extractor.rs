//! Convolutional feature extractor walked by the style metric.
//!
//! The extractor is a flat, ordered stack of layers in the layout of the torchvision VGG
//! `features` module. Every layer is tagged with a [LayerKind] when the extractor is built,
//! so the tap planner only ever matches over a closed set of kinds.

use core::fmt;
use core::str::FromStr;

use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::StyleError;

/// The kinds of layers a feature extractor may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// 2D convolution. Starts a new block.
    Convolution,
    /// ReLU activation.
    Activation,
    /// 2D max pooling.
    Pooling,
    /// 2D batch normalization.
    Normalization,
}

impl LayerKind {
    /// Prefix used when naming layers of this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Convolution => "conv",
            Self::Activation => "relu",
            Self::Pooling => "pool",
            Self::Normalization => "bn",
        }
    }

    /// Class name used in layer specifications.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Convolution => "Conv2d",
            Self::Activation => "ReLU",
            Self::Pooling => "MaxPool2d",
            Self::Normalization => "BatchNorm2d",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl FromStr for LayerKind {
    type Err = StyleError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Conv2d" => Ok(Self::Convolution),
            "ReLU" => Ok(Self::Activation),
            "MaxPool2d" => Ok(Self::Pooling),
            "BatchNorm2d" => Ok(Self::Normalization),
            _ => Err(StyleError::UnrecognizedLayer(name.to_string())),
        }
    }
}

/// Specification of a single extractor layer.
#[derive(Config, Debug)]
pub struct LayerSpec {
    /// Layer class name: `Conv2d`, `ReLU`, `MaxPool2d` or `BatchNorm2d`.
    pub kind: String,
    /// Input and output channels, required by `Conv2d`.
    #[config(default = "None")]
    pub channels: Option<[usize; 2]>,
    /// Number of features, required by `BatchNorm2d`.
    #[config(default = "None")]
    pub features: Option<usize>,
}

impl LayerSpec {
    /// 3x3 convolution with unit padding.
    pub fn conv(channels_in: usize, channels_out: usize) -> Self {
        Self::new(LayerKind::Convolution.to_string()).with_channels(Some([channels_in, channels_out]))
    }

    /// ReLU activation.
    pub fn relu() -> Self {
        Self::new(LayerKind::Activation.to_string())
    }

    /// 2x2 max pooling with stride 2.
    pub fn pool() -> Self {
        Self::new(LayerKind::Pooling.to_string())
    }

    /// Batch normalization over `features` channels.
    pub fn batch_norm(features: usize) -> Self {
        Self::new(LayerKind::Normalization.to_string()).with_features(Some(features))
    }

    fn init<B: Backend>(&self, device: &B::Device) -> Result<FeatureLayer<B>, StyleError> {
        let kind: LayerKind = self.kind.parse()?;

        let layer = match kind {
            LayerKind::Convolution => {
                let channels = self.channels.ok_or_else(|| StyleError::MissingLayerField {
                    kind: self.kind.clone(),
                    field: "channels",
                })?;
                FeatureLayer::Conv(
                    Conv2dConfig::new(channels, [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                )
            }
            LayerKind::Activation => FeatureLayer::Relu(Relu::new()),
            LayerKind::Pooling => FeatureLayer::Pool(
                MaxPool2dConfig::new([2, 2])
                    .with_strides([2, 2])
                    .init(),
            ),
            LayerKind::Normalization => {
                let features = self.features.ok_or_else(|| StyleError::MissingLayerField {
                    kind: self.kind.clone(),
                    field: "features",
                })?;
                FeatureLayer::BatchNorm(BatchNormConfig::new(features).init(device))
            }
        };

        Ok(layer)
    }
}

/// Configuration to create a [feature extractor](FeatureExtractor).
///
/// # Example
///
/// ```ignore
/// use gram_style_metric::FeatureExtractorConfig;
///
/// let extractor = FeatureExtractorConfig::vgg19().init::<B>(&device)?;
/// ```
#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    /// Ordered layer specifications.
    pub layers: Vec<LayerSpec>,
}

impl FeatureExtractorConfig {
    /// The torchvision VGG19 `features` stack: 16 convolutions, 16 activations and 5 poolings.
    pub fn vgg19() -> Self {
        Self::vgg(&[2, 2, 4, 4, 4])
    }

    /// The torchvision VGG16 `features` stack.
    pub fn vgg16() -> Self {
        Self::vgg(&[2, 2, 3, 3, 3])
    }

    fn vgg(convs_per_stage: &[usize]) -> Self {
        const STAGE_CHANNELS: [usize; 5] = [64, 128, 256, 512, 512];

        let mut layers = Vec::new();
        let mut channels_in = 3;

        for (num_convs, channels_out) in convs_per_stage.iter().zip(STAGE_CHANNELS) {
            for _ in 0..*num_convs {
                layers.push(LayerSpec::conv(channels_in, channels_out));
                layers.push(LayerSpec::relu());
                channels_in = channels_out;
            }
            layers.push(LayerSpec::pool());
        }

        Self::new(layers)
    }

    /// Build a layer stack from bare kinds.
    ///
    /// The first convolution maps the 3 image channels to `channels`, every later convolution
    /// keeps `channels`. Mostly useful for small test extractors.
    pub fn from_kinds(kinds: &[LayerKind], channels: usize) -> Self {
        let mut current = 3;
        let layers = kinds
            .iter()
            .map(|kind| match kind {
                LayerKind::Convolution => {
                    let spec = LayerSpec::conv(current, channels);
                    current = channels;
                    spec
                }
                LayerKind::Activation => LayerSpec::relu(),
                LayerKind::Pooling => LayerSpec::pool(),
                LayerKind::Normalization => LayerSpec::batch_norm(current),
            })
            .collect();

        Self::new(layers)
    }

    /// Initialize a new [feature extractor](FeatureExtractor).
    ///
    /// Fails with [StyleError::UnrecognizedLayer] when a layer class is not one of the
    /// supported kinds.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<FeatureExtractor<B>, StyleError> {
        let layers = self
            .layers
            .iter()
            .map(|spec| spec.init(device))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FeatureExtractor { layers })
    }
}

/// A single extractor layer, tagged by kind.
#[derive(Module, Debug)]
pub enum FeatureLayer<B: Backend> {
    /// Convolution layer.
    Conv(Conv2d<B>),
    /// Activation layer.
    Relu(Relu),
    /// Max pooling layer.
    Pool(MaxPool2d),
    /// Batch normalization layer.
    BatchNorm(BatchNorm<B>),
}

impl<B: Backend> FeatureLayer<B> {
    /// The kind of this layer.
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Conv(_) => LayerKind::Convolution,
            Self::Relu(_) => LayerKind::Activation,
            Self::Pool(_) => LayerKind::Pooling,
            Self::BatchNorm(_) => LayerKind::Normalization,
        }
    }

    /// Applies the layer to `input`.
    ///
    /// Every layer returns a new tensor. In particular the activation never writes over its
    /// input, so features captured before it stay intact.
    ///
    /// # Shapes
    ///
    /// - input: `[batch, channels_in, height, width]`
    /// - output: `[batch, channels_out, height_out, width_out]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Conv(conv) => conv.forward(input),
            Self::Relu(relu) => relu.forward(input),
            Self::Pool(pool) => pool.forward(input),
            Self::BatchNorm(norm) => norm.forward(input),
        }
    }
}

/// Ordered stack of convolutional layers with fixed weights.
///
/// The extractor is only ever read: style probes are attached around it, never inside it.
/// Pretrained weights are loaded through the record system, e.g.
/// `extractor.load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), &device)`.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    layers: Vec<FeatureLayer<B>>,
}

impl<B: Backend> FeatureExtractor<B> {
    /// The layers in evaluation order.
    pub fn layers(&self) -> &[FeatureLayer<B>] {
        &self.layers
    }

    /// The kind of every layer, in evaluation order.
    pub fn kinds(&self) -> Vec<LayerKind> {
        self.layers.iter().map(FeatureLayer::kind).collect()
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the extractor has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs every layer on `input`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers
            .iter()
            .fold(input, |features, layer| layer.forward(features))
    }
}
