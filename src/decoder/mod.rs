mod fusion;

pub use fusion::*;

use burn::prelude::*;

use crate::encoder::EncoderFeatures;

/// U-Net style decoder that restores the encoder's input resolution by additive fusion.
#[derive(Module, Debug)]
pub struct UpsampleDecoder<B: Backend> {
    /// One block per transition skip, in pop order.
    skip_blocks: Vec<FusionBlock<B>>,
    stem_block: FusionBlock<B>,
}

impl<B: Backend> UpsampleDecoder<B> {
    pub fn forward(&self, features: EncoderFeatures<B>) -> Tensor<B, 4> {
        let EncoderFeatures {
            stem,
            skips,
            deepest,
        } = features;
        assert_eq!(
            skips.len(),
            self.skip_blocks.len(),
            "Decoder expects exactly {} skip tensors",
            self.skip_blocks.len()
        );

        let mut x = deepest;
        // Most recently pushed skip first.
        for (block, skip) in self.skip_blocks.iter().zip(skips.into_iter().rev()) {
            x = block.forward(x, skip);
        }
        let x = self.stem_block.forward(x, stem);

        upsample2x(x)
    }
}

#[derive(Config, Debug)]
pub struct UpsampleDecoderConfig {
    /// Channel count of the deepest encoder feature map.
    in_channels: usize,
    /// Skip channel counts in push order.
    skip_channels: Vec<usize>,
    stem_channels: usize,
}

impl UpsampleDecoderConfig {
    pub fn out_channels(&self) -> usize {
        self.stem_channels
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> UpsampleDecoder<B> {
        let mut in_channels = self.in_channels;
        let skip_blocks = self
            .skip_channels
            .iter()
            .rev()
            .map(|&skip_channels| {
                let block = FusionBlockConfig::new(in_channels, skip_channels).init(device);
                in_channels = skip_channels;
                block
            })
            .collect();
        let stem_block = FusionBlockConfig::new(in_channels, self.stem_channels).init(device);

        UpsampleDecoder {
            skip_blocks,
            stem_block,
        }
    }
}
