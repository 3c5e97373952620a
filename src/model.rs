//! Extractor prefix with style probes interleaved.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::planner::TapPlan;
use crate::probe::StyleProbe;
use crate::{FeatureExtractor, FeatureLayer};

/// Per-channel input normalization applied before the first extractor layer.
///
/// output = (input - mean) / std
#[derive(Debug, Clone)]
pub struct Normalization<B: Backend> {
    mean: Tensor<B, 4>,
    std: Tensor<B, 4>,
}

impl<B: Backend> Normalization<B> {
    /// Create the normalization from per-channel constants.
    pub fn new(mean: [f32; 3], std: [f32; 3], device: &B::Device) -> Self {
        Self {
            mean: Tensor::<B, 1>::from_floats(mean, device).reshape([1, 3, 1, 1]),
            std: Tensor::<B, 1>::from_floats(std, device).reshape([1, 3, 1, 1]),
        }
    }

    /// Normalize an image batch.
    ///
    /// # Shapes
    ///
    /// - input: `[batch, 3, height, width]`
    /// - output: `[batch, 3, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = input.dims();

        let mean = self.mean.clone().expand([batch, channels, height, width]);
        let std = self.std.clone().expand([batch, channels, height, width]);

        input.sub(mean).div(std)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Normalize,
    Layer(usize),
    Probe(usize),
}

/// Normalization, then the extractor layers up to the deepest probe, with every probe placed
/// right after the layer it taps.
///
/// Built once per scoring call. The extractor is borrowed and never changed; the probes are
/// owned by the model and bound to the reference image at construction.
#[derive(Debug)]
pub struct TruncatedModel<'a, B: Backend> {
    normalization: Normalization<B>,
    layers: &'a [FeatureLayer<B>],
    steps: Vec<Step>,
    probes: Vec<StyleProbe<B>>,
}

impl<'a, B: Backend> TruncatedModel<'a, B> {
    /// Lays out the model for `plan` without binding any probe.
    pub fn new(
        extractor: &'a FeatureExtractor<B>,
        normalization: Normalization<B>,
        plan: &TapPlan,
    ) -> Self {
        let mut steps = vec![Step::Normalize];
        let mut probes = Vec::with_capacity(plan.num_probes());

        for layer in plan.layers() {
            steps.push(Step::Layer(layer.index));
            if layer.tapped {
                steps.push(Step::Probe(probes.len()));
                probes.push(StyleProbe::new(layer.name));
            }
        }

        Self {
            normalization,
            layers: extractor.layers(),
            steps,
            probes,
        }
    }

    /// Lays out the model for `plan` and binds every probe to `reference`.
    pub fn build(
        extractor: &'a FeatureExtractor<B>,
        normalization: Normalization<B>,
        plan: &TapPlan,
        reference: Tensor<B, 4>,
    ) -> Self {
        let mut model = Self::new(extractor, normalization, plan);
        model.bind(reference);
        model
    }

    /// Runs `reference` through the model, freezing each probe's target on the way.
    pub fn bind(&mut self, reference: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = reference;

        for step in self.steps.iter() {
            x = match *step {
                Step::Normalize => self.normalization.forward(x),
                Step::Layer(index) => self.layers[index].forward(x),
                Step::Probe(probe) => self.probes[probe].bind(x),
            };
        }

        x
    }

    /// Runs `image` through the model; every bound probe records its deviation.
    ///
    /// The returned tensor is the output of the last retained step.
    pub fn forward(&mut self, image: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = image;

        for step in self.steps.iter() {
            x = match *step {
                Step::Normalize => self.normalization.forward(x),
                Step::Layer(index) => self.layers[index].forward(x),
                Step::Probe(probe) => self.probes[probe].measure(x),
            };
        }

        x
    }

    /// Runs `image` through the model and returns the sum of all probe deviations.
    ///
    /// Deviations are taken out of the probes as soon as the pass ends, so nothing from this
    /// image leaks into the next call.
    ///
    /// # Shapes
    ///
    /// - image: `[1, 3, height, width]`
    /// - output: `[1]`
    pub fn style_deviation(&mut self, image: Tensor<B, 4>) -> Tensor<B, 1> {
        let device = image.device();
        self.forward(image);

        self.probes
            .iter_mut()
            .filter_map(StyleProbe::take_deviation)
            .fold(Tensor::zeros([1], &device), |total, deviation| {
                total.add(deviation)
            })
    }

    /// The probes, in evaluation order.
    pub fn probes(&self) -> &[StyleProbe<B>] {
        &self.probes
    }

    /// Number of steps: the normalization, the retained layers and the probes.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false, the normalization step is always present.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of extractor layers kept.
    pub fn num_layers(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, Step::Layer(_)))
            .count()
    }

    /// Position of the last probe in the step sequence, the normalization being position 0.
    pub fn last_probe_position(&self) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|step| matches!(step, Step::Probe(_)))
    }
}
