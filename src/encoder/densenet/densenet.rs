use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::encoder::EncoderFeatures;

use super::{
    dense_block::{DenseBlock, DenseBlockConfig},
    transition::{Transition, TransitionConfig},
    BN_EPSILON, STEM_CHANNELS,
};

/// DenseNet feature extractor.
/// Derived from [Densely Connected Convolutional Networks](https://arxiv.org/abs/1608.06993).
///
/// Field names follow the torchvision layout so pretrained checkpoints map onto it.
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    conv0: Conv2d<B>,
    norm0: BatchNorm<B, 2>,
    relu: Relu,
    pool0: MaxPool2d,
    blocks: Vec<DenseBlock<B>>,
    transitions: Vec<Transition<B>>,
    norm5: BatchNorm<B, 2>,
}

impl<B: Backend> DenseNet<B> {
    /// Encode a single-channel image batch `[batch, 1, H, W]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> EncoderFeatures<B> {
        // Pretrained stems expect three channels.
        let x = Tensor::cat(vec![x.clone(), x.clone(), x], 1);

        let x = self.conv0.forward(x);
        let x = self.norm0.forward(x);
        let stem = self.relu.forward(x);
        let mut x = self.pool0.forward(stem.clone());

        let mut skips = Vec::with_capacity(self.transitions.len());
        for (stage, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);

            if let Some(transition) = self.transitions.get(stage) {
                let (pooled, before_pool) = transition.forward(x);
                skips.push(before_pool);
                x = pooled;
            }
        }

        let deepest = self.relu.forward(self.norm5.forward(x));

        EncoderFeatures {
            stem,
            skips,
            deepest,
        }
    }
}

/// [DenseNet](DenseNet) configuration.
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Number of dense layers in each of the four stages.
    blocks: [usize; 4],
}

impl DenseNetConfig {
    fn stage_configs(&self) -> (Vec<DenseBlockConfig>, Vec<TransitionConfig>) {
        let mut channels = STEM_CHANNELS;
        let mut blocks = Vec::with_capacity(4);
        let mut transitions = Vec::with_capacity(3);

        for (stage, &num_layers) in self.blocks.iter().enumerate() {
            let block = DenseBlockConfig::new(num_layers, channels);
            channels = block.out_channels();
            blocks.push(block);

            if stage < 3 {
                let transition = TransitionConfig::new(channels);
                channels = transition.out_channels();
                transitions.push(transition);
            }
        }

        (blocks, transitions)
    }

    /// Channel counts of the skip tensors in push order.
    pub fn skip_channels(&self) -> Vec<usize> {
        let (_, transitions) = self.stage_configs();
        transitions.iter().map(|t| t.out_channels()).collect()
    }

    /// Channel count of the deepest feature map.
    pub fn out_channels(&self) -> usize {
        let (blocks, _) = self.stage_configs();
        blocks.last().map_or(STEM_CHANNELS, |b| b.out_channels())
    }

    pub fn stem_channels(&self) -> usize {
        STEM_CHANNELS
    }

    /// Initialize a new [DenseNet](DenseNet) module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };
        let (blocks, transitions) = self.stage_configs();

        // 7x7 conv, 64, /2
        let conv0 = Conv2dConfig::new([3, STEM_CHANNELS], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);

        // 3x3 maxpool, /2
        let pool0 = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        DenseNet {
            conv0,
            norm0: BatchNormConfig::new(STEM_CHANNELS)
                .with_epsilon(BN_EPSILON)
                .init(device),
            relu: Relu::new(),
            pool0,
            blocks: blocks.iter().map(|b| b.init(device)).collect(),
            transitions: transitions.iter().map(|t| t.init(device)).collect(),
            norm5: BatchNormConfig::new(self.out_channels())
                .with_epsilon(BN_EPSILON)
                .init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encoder::densenet::DenseNetPreset, tests::TestBackend};

    #[test]
    fn densenet121_channel_bookkeeping() {
        let config = DenseNetPreset::DenseNet121.encoder_config();

        assert_eq!(config.skip_channels(), vec![128, 256, 512]);
        assert_eq!(config.out_channels(), 1024);
    }

    #[test]
    fn densenet169_and_201_channel_bookkeeping() {
        let densenet169 = DenseNetPreset::DenseNet169.encoder_config();
        assert_eq!(densenet169.skip_channels(), vec![128, 256, 640]);
        assert_eq!(densenet169.out_channels(), 1664);

        let densenet201 = DenseNetPreset::DenseNet201.encoder_config();
        assert_eq!(densenet201.skip_channels(), vec![128, 256, 896]);
        assert_eq!(densenet201.out_channels(), 1920);
    }

    #[test]
    fn encoder_records_three_skips_for_every_preset() {
        let device = Default::default();

        for preset in DenseNetPreset::ALL {
            let config = preset.encoder_config();
            let encoder = config.init::<TestBackend>(&device);
            let features = encoder.forward(Tensor::ones([1, 1, 32, 32], &device));

            assert_eq!(features.skips.len(), 3, "{}", preset.name());
            assert_eq!(features.stem.dims(), [1, 64, 16, 16]);

            let skip_dims: Vec<_> = features.skips.iter().map(|s| s.dims()).collect();
            let [c2, c3, c4] = [
                config.skip_channels()[0],
                config.skip_channels()[1],
                config.skip_channels()[2],
            ];
            assert_eq!(
                skip_dims,
                vec![[1, c2, 8, 8], [1, c3, 4, 4], [1, c4, 2, 2]]
            );
            assert_eq!(features.deepest.dims(), [1, config.out_channels(), 1, 1]);
        }
    }
}
