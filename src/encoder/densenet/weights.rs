use std::path::Path;

use burn::{
    record::{FullPrecisionSettings, Recorder, RecorderError},
    tensor::{backend::Backend, Device},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use super::DenseNetRecord;

/// Remote checkpoint location and its pinned integrity hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PretrainedWeights {
    pub url: &'static str,
    /// Leading hex digits of the file's SHA-256 digest.
    pub sha256_prefix: &'static str,
}

impl PretrainedWeights {
    /// Cache file name, taken from the last URL segment.
    pub fn file_name(&self) -> &'static str {
        self.url.rsplit_once('/').map_or(self.url, |(_, name)| name)
    }
}

/// Most dense layers in any stage across the presets (DenseNet-201, stage 3).
const MAX_LAYERS: usize = 48;

/// Ordered `(pattern, replacement)` rules turning torchvision DenseNet keys into
/// [DenseNet](super::DenseNet) field paths. Rules apply in sequence to every key.
pub(crate) fn key_remaps() -> Vec<(String, String)> {
    let mut remaps = vec![
        // Legacy checkpoints spell *.norm.1.* / *.conv.2.*
        (
            "(.+)\\.(norm|conv)\\.([12])\\.(.+)".to_string(),
            "$1.$2$3.$4".to_string(),
        ),
        ("^features\\.(.+)".to_string(), "$1".to_string()),
    ];

    remaps.extend((1..=4).map(|stage| {
        (
            format!("^denseblock{stage}\\.(.+)"),
            format!("blocks.{}.$1", stage - 1),
        )
    }));
    remaps.extend((1..=MAX_LAYERS).map(|layer| {
        (
            format!("^blocks\\.([0-3])\\.denselayer{layer}\\.(.+)"),
            format!("blocks.$1.layers.{}.$2", layer - 1),
        )
    }));
    remaps.extend((1..=3).map(|stage| {
        (
            format!("^transition{stage}\\.(.+)"),
            format!("transitions.{}.$1", stage - 1),
        )
    }));

    remaps
}

/// Load a torchvision DenseNet state_dict as an encoder record.
///
/// The classifier keys are ignored; everything under `features.` is remapped onto
/// [DenseNet](super::DenseNet) field names.
pub(crate) fn load_weights_record<B: Backend, P: AsRef<Path>>(
    torch_weights: P,
    device: &Device<B>,
) -> Result<DenseNetRecord<B>, RecorderError> {
    let load_args = key_remaps().iter().fold(
        LoadArgs::new(torch_weights.as_ref().into()),
        |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
    );

    PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)
}
