#[cfg(feature = "pretrained")]
mod download;
#[cfg(feature = "pretrained")]
pub(crate) use download::download;

mod error;
pub use error::DenseNetError;

pub mod decoder;
pub mod encoder;
pub mod mask;
pub mod segmentation_head;
pub mod volume;

mod model;
pub use model::*;
