use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Normalized Gram matrix of a feature map.
///
/// Channels are flattened over their spatial positions and multiplied with their own transpose,
/// then divided by `batch * channels * height * width`. For a batch of one the output is the
/// `[channels, channels]` matrix of channel correlations.
///
/// # Shapes
///
/// - features: `[batch, channels, height, width]`
/// - output: `[batch * channels, batch * channels]`
pub fn gram_matrix<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = features.dims();

    let features = features.reshape([batch * channels, height * width]);
    let gram = features.clone().matmul(features.transpose());

    gram.div_scalar((batch * channels * height * width) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::{ops::FloatElem, Distribution, TensorData, Tolerance};

    type FT = FloatElem<TestBackend>;

    #[test]
    fn gram_values() {
        let device = Default::default();
        // Two channels over a 1x2 map: [1, 2] and [3, 4].
        let features =
            Tensor::<TestBackend, 4>::from_floats([[[[1.0, 2.0]], [[3.0, 4.0]]]], &device);

        let gram = gram_matrix(features);

        // Divisor: 1 * 2 * 1 * 2 = 4.
        let expected = TensorData::from([[5.0 / 4.0, 11.0 / 4.0], [11.0 / 4.0, 25.0 / 4.0]]);
        gram.into_data()
            .assert_approx_eq::<FT>(&expected, Tolerance::default());
    }

    #[test]
    fn gram_is_symmetric() {
        let device = Default::default();
        let features =
            Tensor::<TestBackend, 4>::random([1, 6, 5, 7], Distribution::Default, &device);

        let gram = gram_matrix(features);

        assert_eq!(gram.dims(), [6, 6]);
        gram.clone()
            .into_data()
            .assert_approx_eq::<FT>(&gram.transpose().into_data(), Tolerance::default());
    }

    #[test]
    fn gram_ignores_spatial_layout() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 4>::from_floats(
            [[[[1.0, 2.0], [3.0, 4.0]], [[0.5, -1.0], [2.0, 0.0]]]],
            &device,
        );
        // Same per-channel values, spatial positions permuted identically in both channels.
        let shuffled = Tensor::<TestBackend, 4>::from_floats(
            [[[[4.0, 3.0], [2.0, 1.0]], [[0.0, 2.0], [-1.0, 0.5]]]],
            &device,
        );

        gram_matrix(features)
            .into_data()
            .assert_approx_eq::<FT>(&gram_matrix(shuffled).into_data(), Tolerance::default());
    }
}
