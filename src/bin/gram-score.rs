use std::path::PathBuf;
use std::process;

use burn::config::Config;
use clap::Parser;
use gram_style_metric::{GramMetricConfig, ImageLoaderConfig, StyleError};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "ndarray")]
type Backend = burn::backend::NdArray<f32>;
#[cfg(all(feature = "tch-cpu", not(feature = "ndarray")))]
type Backend = burn::backend::LibTorch<f32>;
#[cfg(all(feature = "wgpu", not(any(feature = "ndarray", feature = "tch-cpu"))))]
type Backend = burn::backend::Wgpu;

/// Gram matrix style score of rendered images against a reference image.
#[derive(Parser, Debug)]
#[command(name = "gram-score")]
struct Args {
    /// Extractor weights saved with the named MessagePack recorder.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Metric configuration (JSON). Defaults to VGG19 with conv_1..conv_5.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Length of the shorter image edge after resizing.
    #[arg(long)]
    image_size: Option<usize>,

    /// Reference image.
    reference: PathBuf,

    /// Rendered images to score.
    #[arg(required = true)]
    rendered: Vec<PathBuf>,
}

fn run(args: Args) -> Result<f64, StyleError> {
    let device = Default::default();

    let mut config = match &args.config {
        Some(path) => GramMetricConfig::load(path)?,
        None => GramMetricConfig::new(),
    };
    if let Some(image_size) = args.image_size {
        config = config.with_image(ImageLoaderConfig::new().with_image_size(image_size));
    }

    let metric = config.init::<Backend>(&device)?;
    let metric = match &args.weights {
        Some(path) => metric.load_weights(path)?,
        None => {
            log::warn!("No weights given, scoring with a randomly initialized extractor");
            metric
        }
    };

    metric.compute_score(&args.reference, &args.rendered)
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();

    match run(args) {
        Ok(score) => println!("{score}"),
        Err(err) => {
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}
