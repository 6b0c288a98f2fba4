//! Optional volumetric refinement around an injected 3-D sub-network.

mod bottleneck;
mod conv3d_block;
mod stage;

pub use bottleneck::*;
pub use conv3d_block::*;
pub use stage::*;

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

/// A 3-D sub-network run at half the volume's resolution.
///
/// Receives `[batch, channels, S/2, H/2, W/2]` and must return a tensor at the
/// full `[S, H, W]` resolution so it can be concatenated with the pre-downsample
/// features.
pub trait VolumeNetwork: Module<Self::Backend> {
    type Backend: Backend;
    fn forward(&self, x: Tensor<Self::Backend, 5>) -> Tensor<Self::Backend, 5>;
}

pub trait VolumeNetworkConfig<B: Backend> {
    type Network: VolumeNetwork<Backend = B>;
    fn init(&self, in_channels: usize, device: &B::Device) -> Self::Network;
    fn out_channels(&self) -> usize;
}
