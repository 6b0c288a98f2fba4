use burn::tensor::{backend::Backend, Int, Tensor};

/// Force the background class outside the region of interest.
///
/// `probs` is `[batch, classes, ...]` and `mask` is `[batch, 1, ...]`. Wherever the
/// mask is zero the output is the one-hot vector on channel 0; wherever it is
/// nonzero the probabilities pass through unchanged. Any nonzero mask value counts
/// as inside, so the result does not depend on the mask's magnitude.
pub fn apply_mask<B: Backend, const D: usize>(
    probs: Tensor<B, D>,
    mask: Tensor<B, D, Int>,
) -> Tensor<B, D> {
    let dims = probs.dims();
    let classes = dims[1];
    let inside = mask.not_equal_elem(0).float();

    let background = inside.clone().neg().add_scalar(1.0);
    let fill = if classes > 1 {
        let mut zero_dims = dims;
        zero_dims[1] = classes - 1;
        let zeros = Tensor::zeros(zero_dims, &probs.device());
        Tensor::cat(vec![background, zeros], 1)
    } else {
        background
    };

    probs * inside + fill
}

#[cfg(test)]
mod tests {
    use burn::tensor::{activation::softmax, Distribution};

    use super::*;
    use crate::tests::TestBackend;

    fn probs(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        softmax(
            Tensor::random([2, 3, 4, 4], Distribution::Normal(0.0, 1.0), device),
            1,
        )
    }

    #[test]
    fn all_ones_mask_is_identity() {
        let device = Default::default();
        let probs = probs(&device);
        let mask = Tensor::<TestBackend, 4, Int>::ones([2, 1, 4, 4], &device);

        apply_mask(probs.clone(), mask)
            .into_data()
            .assert_approx_eq(&probs.into_data(), 5);
    }

    #[test]
    fn all_zeros_mask_is_one_hot_background() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 4, Int>::zeros([2, 1, 4, 4], &device);

        let out = apply_mask(probs(&device), mask);

        let expected = Tensor::cat(
            vec![
                Tensor::<TestBackend, 4>::ones([2, 1, 4, 4], &device),
                Tensor::zeros([2, 2, 4, 4], &device),
            ],
            1,
        );
        out.into_data().assert_approx_eq(&expected.into_data(), 5);
    }

    #[test]
    fn masking_is_idempotent() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 4, Int>::from_ints(
            [[[[1, 0, 1, 0], [0, 0, 1, 1], [1, 1, 1, 1], [0, 0, 0, 0]]]],
            &device,
        );
        let probs = softmax(
            Tensor::<TestBackend, 4>::random([1, 3, 4, 4], Distribution::Default, &device),
            1,
        );

        let once = apply_mask(probs, mask.clone());
        let twice = apply_mask(once.clone(), mask);

        twice.into_data().assert_approx_eq(&once.into_data(), 5);
    }

    #[test]
    fn nonzero_mask_values_count_as_inside() {
        let device = Default::default();
        let probs = probs(&device);

        let binary = apply_mask(
            probs.clone(),
            Tensor::<TestBackend, 4, Int>::ones([2, 1, 4, 4], &device),
        );
        let scaled = apply_mask(
            probs,
            Tensor::<TestBackend, 4, Int>::full([2, 1, 4, 4], 7, &device),
        );

        scaled.into_data().assert_approx_eq(&binary.into_data(), 5);
    }

    #[test]
    fn single_class_masks_to_background() {
        let device = Default::default();
        let probs = Tensor::<TestBackend, 5>::full([1, 1, 2, 2, 2], 0.25, &device);
        let mask = Tensor::<TestBackend, 1, Int>::from_ints([1, 0, 0, 1, 0, 0, 1, 1], &device)
            .reshape([1, 1, 2, 2, 2]);

        let expected = Tensor::<TestBackend, 1>::from_floats(
            [0.25, 1.0, 1.0, 0.25, 1.0, 1.0, 0.25, 0.25],
            &device,
        )
        .reshape([1, 1, 2, 2, 2]);
        apply_mask(probs, mask)
            .into_data()
            .assert_approx_eq(&expected.into_data(), 5);
    }
}
