use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::ops::{InterpolateMode, InterpolateOptions},
};

/// Nearest-neighbour 2x upsampling of a `[batch, channels, H, W]` tensor.
pub fn upsample2x<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    burn::tensor::module::interpolate(
        x,
        [height * 2, width * 2],
        InterpolateOptions::new(InterpolateMode::Nearest),
    )
}

/// Upsamples, projects to the skip's width and adds the skip tensor.
#[derive(Module, Debug)]
pub struct FusionBlock<B: Backend> {
    conv: Conv2d<B>,
    batchnorm: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> FusionBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(upsample2x(x));
        let x = self.relu.forward(self.batchnorm.forward(x));

        x + skip
    }
}

#[derive(Config, Debug)]
pub struct FusionBlockConfig {
    in_channels: usize,
    skip_channels: usize,
}

impl FusionBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FusionBlock<B> {
        FusionBlock {
            conv: Conv2dConfig::new([self.in_channels, self.skip_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            batchnorm: BatchNormConfig::new(self.skip_channels).init(device),
            relu: Relu::new(),
        }
    }
}
