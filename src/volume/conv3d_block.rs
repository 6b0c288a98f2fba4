use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig3d, Relu,
    },
    prelude::*,
};

use crate::encoder::densenet::BN_EPSILON;

#[derive(Module, Debug)]
pub struct Conv3dBlock<B: Backend> {
    conv: Conv3d<B>,
    batchnorm: BatchNorm<B, 3>,
    relu: Relu,
}

impl<B: Backend> Conv3dBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        self.relu.forward(self.batchnorm.forward(x))
    }
}

/// Conv3d (no bias, "same"-style padding) + batch norm + ReLU.
#[derive(Config, Debug)]
pub struct Conv3dBlockConfig {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    #[config(default = 1)]
    stride: usize,
}

impl Conv3dBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv3dBlock<B> {
        let k = self.kernel_size;
        let pad = k / 2;
        Conv3dBlock {
            conv: Conv3dConfig::new([self.in_channels, self.out_channels], [k, k, k])
                .with_stride([self.stride; 3])
                .with_padding(PaddingConfig3d::Explicit(pad, pad, pad))
                .with_bias(false)
                .init(device),
            batchnorm: BatchNormConfig::new(self.out_channels)
                .with_epsilon(BN_EPSILON)
                .init(device),
            relu: Relu::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn stride_two_halves_every_axis() {
        let device = Default::default();
        let block = Conv3dBlockConfig::new(2, 4, 3)
            .with_stride(2)
            .init::<TestBackend>(&device);

        let out = block.forward(Tensor::ones([1, 2, 4, 8, 8], &device));

        assert_eq!(out.dims(), [1, 4, 2, 4, 4]);
    }

    #[test]
    fn odd_kernels_keep_the_shape() {
        let device = Default::default();
        let block = Conv3dBlockConfig::new(2, 3, 5).init::<TestBackend>(&device);

        let out = block.forward(Tensor::ones([1, 2, 2, 6, 6], &device));

        assert_eq!(out.dims(), [1, 3, 2, 6, 6]);
    }
}
