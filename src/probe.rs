use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::gram::gram_matrix;
use crate::planner::LayerName;

/// Style measurement point attached after one extractor layer.
///
/// A probe starts unbound. [bind](StyleProbe::bind) freezes the Gram matrix of the reference
/// features once; every later [measure](StyleProbe::measure) compares the Gram matrix of the
/// current features against it. Both pass their input through untouched.
#[derive(Debug, Clone)]
pub struct StyleProbe<B: Backend> {
    name: LayerName,
    target: Option<Tensor<B, 2>>,
    deviation: Option<Tensor<B, 1>>,
}

impl<B: Backend> StyleProbe<B> {
    /// Creates an unbound probe for the layer `name`.
    pub fn new(name: LayerName) -> Self {
        Self {
            name,
            target: None,
            deviation: None,
        }
    }

    /// Name of the tapped layer.
    pub fn name(&self) -> LayerName {
        self.name
    }

    /// Whether the target is frozen.
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    /// Freezes the Gram matrix of `features` as the target.
    ///
    /// The target is written once: binding an already bound probe keeps the first target.
    pub fn bind(&mut self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.target.is_none() {
            self.target = Some(gram_matrix(features.clone()).detach());
        } else {
            log::debug!("Probe {} already bound, keeping its target", self.name);
        }

        features
    }

    /// Records the mean squared error between the Gram matrix of `features` and the target.
    ///
    /// An unbound probe has nothing to compare against and records nothing.
    pub fn measure(&mut self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        if let Some(target) = &self.target {
            let gram = gram_matrix(features.clone());
            let loss = MseLoss::new().forward(gram, target.clone(), Reduction::Mean);
            self.deviation = Some(loss);
        }

        features
    }

    /// Deviation recorded by the last [measure](StyleProbe::measure), as a `[1]` tensor.
    pub fn deviation(&self) -> Option<Tensor<B, 1>> {
        self.deviation.clone()
    }

    /// Takes the last recorded deviation out of the probe.
    pub fn take_deviation(&mut self) -> Option<Tensor<B, 1>> {
        self.deviation.take()
    }
}
