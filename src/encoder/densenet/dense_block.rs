use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::{BN_EPSILON, GROWTH_RATE};

/// One bottlenecked growth step of a dense block.
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    norm1: BatchNorm<B, 2>,
    conv1: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> DenseLayer<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.relu.forward(self.norm1.forward(x.clone()));
        let out = self.conv1.forward(out);
        let out = self.relu.forward(self.norm2.forward(out));
        let out = self.conv2.forward(out);

        Tensor::cat(vec![x, out], 1)
    }
}

#[derive(Config, Debug)]
pub struct DenseLayerConfig {
    in_channels: usize,
    #[config(default = "GROWTH_RATE")]
    growth_rate: usize,
}

impl DenseLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseLayer<B> {
        let bottleneck = 4 * self.growth_rate;
        DenseLayer {
            norm1: BatchNormConfig::new(self.in_channels)
                .with_epsilon(BN_EPSILON)
                .init(device),
            conv1: Conv2dConfig::new([self.in_channels, bottleneck], [1, 1])
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(bottleneck)
                .with_epsilon(BN_EPSILON)
                .init(device),
            conv2: Conv2dConfig::new([bottleneck, self.growth_rate], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            relu: Relu::new(),
        }
    }
}

/// A stage of dense layers, each concatenating `growth_rate` new channels onto its input.
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| layer.forward(x))
    }
}

#[derive(Config, Debug)]
pub struct DenseBlockConfig {
    num_layers: usize,
    in_channels: usize,
    #[config(default = "GROWTH_RATE")]
    growth_rate: usize,
}

impl DenseBlockConfig {
    pub fn out_channels(&self) -> usize {
        self.in_channels + self.num_layers * self.growth_rate
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseBlock<B> {
        let layers = (0..self.num_layers)
            .map(|i| {
                DenseLayerConfig::new(self.in_channels + i * self.growth_rate)
                    .with_growth_rate(self.growth_rate)
                    .init(device)
            })
            .collect();

        DenseBlock { layers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn dense_block_grows_channels_additively() {
        let device = Default::default();
        let config = DenseBlockConfig::new(3, 64);
        let block = config.init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::ones([2, 64, 8, 8], &device);
        let out = block.forward(x);

        assert_eq!(config.out_channels(), 64 + 3 * 32);
        assert_eq!(out.dims(), [2, 160, 8, 8]);
    }

    #[test]
    fn dense_layer_keeps_its_input_channels_first() {
        let device = Default::default();
        let layer = DenseLayerConfig::new(4)
            .with_growth_rate(2)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::random(
            [1, 4, 4, 4],
            burn::tensor::Distribution::Default,
            &device,
        );
        let out = layer.forward(x.clone());

        assert_eq!(out.dims(), [1, 6, 4, 4]);
        out.narrow(1, 0, 4)
            .into_data()
            .assert_approx_eq(&x.into_data(), 5);
    }
}
