use burn::config::ConfigError;
use burn::record::RecorderError;
use image::ImageError;

/// Errors raised while building or evaluating the Gram style metric.
#[derive(thiserror::Error, Debug)]
pub enum StyleError {
    /// The feature extractor contains a layer this metric cannot walk.
    #[error("Unrecognized layer: {0}")]
    UnrecognizedLayer(String),

    /// A layer specification is missing a field its kind requires.
    #[error("{kind} layer is missing required field `{field}`")]
    MissingLayerField {
        /// Layer class name.
        kind: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// At least one rendered image is needed to average over.
    #[error("no rendered images were supplied")]
    NoRenderedImages,

    /// Images are scored one at a time.
    #[error("expected an image batch of size 1, got {0}")]
    BatchSize(usize),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Weight loading error.
    #[error("Record error: {0}")]
    Record(#[from] RecorderError),

    /// Config loading error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
