use burn::{
    config::Config,
    module::Module,
    nn::conv::{Conv2d, Conv2dConfig},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// Per-pixel class projection with a softmax over the channel axis.
#[derive(Module, Debug)]
pub struct SegmentationHead<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> SegmentationHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        softmax(self.conv.forward(x), 1)
    }
}

#[derive(Config, Debug)]
pub struct SegmentationHeadConfig {
    in_channels: usize,
    classes: usize,
}

impl SegmentationHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SegmentationHead<B> {
        SegmentationHead {
            conv: Conv2dConfig::new([self.in_channels, self.classes], [1, 1]).init(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn head_outputs_a_distribution_per_pixel() {
        let device = Default::default();
        let head = SegmentationHeadConfig::new(8, 3).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::random([2, 8, 4, 4], Distribution::Default, &device);
        let out = head.forward(x);

        assert_eq!(out.dims(), [2, 3, 4, 4]);
        out.sum_dim(1)
            .into_data()
            .assert_approx_eq(&Tensor::<TestBackend, 4>::ones([2, 1, 4, 4], &device).into_data(), 4);
    }
}
