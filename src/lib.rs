#![warn(missing_docs)]

//! Gram-matrix style similarity between a reference image and rendered images.
//!
//! Style probes are tapped into a fixed convolutional feature extractor at named layers. Each
//! probe freezes the Gram matrix of the reference features and reports the mean squared error
//! of every rendered image's Gram matrix against it. The per-layer errors are summed per image
//! and averaged over the rendered images.

mod config;
mod error;
mod extractor;
mod loader;
mod metric;

/// Gram matrix transform.
pub mod gram;

/// Truncated evaluation model.
pub mod model;

/// Layer naming and probe placement.
pub mod planner;

/// Style deviation probe.
pub mod probe;

pub use config::*;
pub use error::*;
pub use extractor::*;
pub use loader::*;
pub use metric::*;

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;
