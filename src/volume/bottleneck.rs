use burn::{
    nn::conv::{ConvTranspose3d, ConvTranspose3dConfig},
    prelude::*,
};

use super::{Conv3dBlock, Conv3dBlockConfig, VolumeNetwork, VolumeNetworkConfig};

/// Minimal [VolumeNetwork]: one conv block at half resolution, then a learned 2x upsample.
#[derive(Module, Debug)]
pub struct VolumeBottleneck<B: Backend> {
    block: Conv3dBlock<B>,
    up: ConvTranspose3d<B>,
}

impl<B: Backend> VolumeNetwork for VolumeBottleneck<B> {
    type Backend = B;
    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        self.up.forward(self.block.forward(x))
    }
}

#[derive(Config, Debug)]
pub struct VolumeBottleneckConfig {
    #[config(default = 32)]
    channels: usize,
}

impl<B: Backend> VolumeNetworkConfig<B> for VolumeBottleneckConfig {
    type Network = VolumeBottleneck<B>;
    fn init(&self, in_channels: usize, device: &B::Device) -> VolumeBottleneck<B> {
        VolumeBottleneck {
            block: Conv3dBlockConfig::new(in_channels, self.channels, 3).init(device),
            up: ConvTranspose3dConfig::new([self.channels, self.channels], [2, 2, 2])
                .with_stride([2, 2, 2])
                .init(device),
        }
    }
    fn out_channels(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn bottleneck_doubles_resolution() {
        let device = Default::default();
        let config = VolumeBottleneckConfig::new().with_channels(6);
        let network: VolumeBottleneck<TestBackend> = config.init(4, &device);

        let out = network.forward(Tensor::ones([1, 4, 1, 4, 4], &device));

        assert_eq!(
            out.dims(),
            [1, VolumeNetworkConfig::<TestBackend>::out_channels(&config), 2, 8, 8]
        );
    }
}
