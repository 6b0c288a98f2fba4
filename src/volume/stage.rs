use burn::{
    nn::conv::{Conv3d, Conv3dConfig},
    prelude::*,
    tensor::activation::softmax,
};

use super::{Conv3dBlock, Conv3dBlockConfig, VolumeNetwork};

/// Width of every convolution in the refinement shell.
const SHELL_CHANNELS: usize = 32;

/// 3-D shell that re-reads the raw volume and mask, fuses them with the 2-D decoder
/// features and classifies every voxel.
#[derive(Module, Debug)]
pub struct VolumetricStage<B: Backend> {
    input_conv1: Conv3dBlock<B>,
    input_conv2: Conv3dBlock<B>,
    down: Conv3dBlock<B>,
    decode: Conv3dBlock<B>,
    classifier: Conv3d<B>,
}

impl<B: Backend> VolumetricStage<B> {
    /// * `image` - `[batch, 1, S, H, W]`
    /// * `mask` - `[batch, 1, S, H, W]`
    /// * `features` - decoder output restored to `[batch, C, S, H, W]`
    ///
    /// Returns per-voxel class probabilities `[batch, classes, S, H, W]`.
    pub fn forward<N: VolumeNetwork<Backend = B>>(
        &self,
        image: Tensor<B, 5>,
        mask: Tensor<B, 5, Int>,
        features: Tensor<B, 5>,
        network: &N,
    ) -> Tensor<B, 5> {
        let x = Tensor::cat(vec![image, mask.float()], 1);
        let x = self.input_conv1.forward(x);
        let x = self.input_conv2.forward(x);
        let x0 = Tensor::cat(vec![x, features], 1);

        let x = self.down.forward(x0.clone());
        let x = network.forward(x);

        let x = self.decode.forward(Tensor::cat(vec![x, x0], 1));
        softmax(self.classifier.forward(x), 1)
    }
}

#[derive(Config, Debug)]
pub struct VolumetricStageConfig {
    /// Channels of the decoder features fused into the shell.
    feature_channels: usize,
    /// Channels returned by the injected network.
    network_channels: usize,
    classes: usize,
}

impl VolumetricStageConfig {
    /// Channels handed to the injected network.
    pub fn network_in_channels(&self) -> usize {
        SHELL_CHANNELS
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VolumetricStage<B> {
        let fused = SHELL_CHANNELS + self.feature_channels;
        VolumetricStage {
            input_conv1: Conv3dBlockConfig::new(2, SHELL_CHANNELS, 5).init(device),
            input_conv2: Conv3dBlockConfig::new(SHELL_CHANNELS, SHELL_CHANNELS, 3).init(device),
            down: Conv3dBlockConfig::new(fused, SHELL_CHANNELS, 3)
                .with_stride(2)
                .init(device),
            decode: Conv3dBlockConfig::new(self.network_channels + fused, SHELL_CHANNELS, 3)
                .init(device),
            classifier: Conv3dConfig::new([SHELL_CHANNELS, self.classes], [1, 1, 1])
                .with_bias(false)
                .init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        tests::TestBackend,
        volume::{VolumeBottleneck, VolumeBottleneckConfig, VolumeNetworkConfig},
    };

    #[test]
    fn stage_classifies_every_voxel() {
        let device = Default::default();
        let network_config = VolumeBottleneckConfig::new().with_channels(4);
        let config = VolumetricStageConfig::new(
            8,
            VolumeNetworkConfig::<TestBackend>::out_channels(&network_config),
            3,
        );
        let stage = config.init::<TestBackend>(&device);
        let network: VolumeBottleneck<TestBackend> =
            network_config.init(config.network_in_channels(), &device);

        let out = stage.forward(
            Tensor::ones([1, 1, 2, 8, 8], &device),
            Tensor::ones([1, 1, 2, 8, 8], &device),
            Tensor::zeros([1, 8, 2, 8, 8], &device),
            &network,
        );

        assert_eq!(out.dims(), [1, 3, 2, 8, 8]);
        out.sum_dim(1).into_data().assert_approx_eq(
            &Tensor::<TestBackend, 5>::ones([1, 1, 2, 8, 8], &device).into_data(),
            4,
        );
    }
}
