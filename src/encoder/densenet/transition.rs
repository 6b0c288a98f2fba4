use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig},
        BatchNorm, BatchNormConfig, Relu,
    },
    prelude::*,
};

use super::{BN_EPSILON, REDUCTION};

/// Channel compression followed by a 2x spatial downsampling.
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    norm: BatchNorm<B, 2>,
    relu: Relu,
    conv: Conv2d<B>,
    pool: AvgPool2d,
}

impl<B: Backend> Transition<B> {
    /// Returns the pooled tensor and the compressed tensor just before pooling.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let x = self.relu.forward(self.norm.forward(x));
        let before_pool = self.conv.forward(x);
        let pooled = self.pool.forward(before_pool.clone());

        (pooled, before_pool)
    }
}

#[derive(Config, Debug)]
pub struct TransitionConfig {
    in_channels: usize,
    #[config(default = "REDUCTION")]
    reduction: f64,
}

impl TransitionConfig {
    pub fn out_channels(&self) -> usize {
        (self.in_channels as f64 * self.reduction) as usize
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Transition<B> {
        let out_channels = self.out_channels();
        assert!(
            out_channels > 0,
            "Transition of {} channels with reduction {} leaves no channels",
            self.in_channels,
            self.reduction
        );

        Transition {
            norm: BatchNormConfig::new(self.in_channels)
                .with_epsilon(BN_EPSILON)
                .init(device),
            relu: Relu::new(),
            conv: Conv2dConfig::new([self.in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn transition_halves_channels_and_resolution() {
        let device = Default::default();
        let transition = TransitionConfig::new(256).init::<TestBackend>(&device);

        let (pooled, before_pool) =
            transition.forward(Tensor::<TestBackend, 4>::ones([1, 256, 8, 8], &device));

        assert_eq!(before_pool.dims(), [1, 128, 8, 8]);
        assert_eq!(pooled.dims(), [1, 128, 4, 4]);
    }

    #[test]
    fn transition_channels_round_down() {
        assert_eq!(TransitionConfig::new(97).out_channels(), 48);
        assert_eq!(TransitionConfig::new(1).out_channels(), 0);
    }
}
