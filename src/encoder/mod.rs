pub mod densenet;

use burn::tensor::{backend::Backend, Tensor};

/// Feature maps recorded by the encoder for the decoder.
#[derive(Debug, Clone)]
pub struct EncoderFeatures<B: Backend> {
    /// Stem activation at half the input resolution.
    pub stem: Tensor<B, 4>,
    /// Pre-pooling transition outputs in push order; the decoder consumes them last-in-first-out.
    pub skips: Vec<Tensor<B, 4>>,
    /// Output of the last dense block after the final norm and activation.
    pub deepest: Tensor<B, 4>,
}
