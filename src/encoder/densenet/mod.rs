mod dense_block;
mod densenet;
mod presets;
mod transition;
mod weights;

pub use dense_block::*;
pub use densenet::*;
pub use presets::*;
pub use transition::*;
pub use weights::PretrainedWeights;
pub(crate) use weights::load_weights_record;

/// Channels added by every dense layer.
pub const GROWTH_RATE: usize = 32;
/// Channel compression applied by transition blocks.
pub const REDUCTION: f64 = 0.5;
pub(crate) const STEM_CHANNELS: usize = 64;
pub(crate) const BN_EPSILON: f64 = 1.001e-5;
