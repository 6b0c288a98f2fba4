use burn::record::RecorderError;

/// Errors raised while assembling a [`HybridDenseNet`](crate::HybridDenseNet).
#[derive(Debug, thiserror::Error)]
pub enum DenseNetError {
    #[error("`classes` must be at least 1")]
    NoClasses,

    #[error("If using ImageNet weights with `include_top` set, `classes` should be 1000 (got {classes})")]
    ImageNetClasses { classes: usize },

    #[error("the volumetric refinement stage needs `collapse_axis` to be enabled")]
    VolumeWithoutCollapse,

    #[error("no pretrained weights are published for block configuration {blocks:?}")]
    UnknownPreset { blocks: [usize; 4] },

    #[cfg(not(feature = "pretrained"))]
    #[error("please enable the `pretrained` feature to use ImageNet weights")]
    PretrainedDisabled,

    #[cfg(feature = "pretrained")]
    #[error("could not locate the home directory for the weights cache")]
    NoCacheDir,

    #[cfg(feature = "pretrained")]
    #[error("hash mismatch for {path:?}: expected sha256 prefix {expected}, got {actual}")]
    HashMismatch {
        path: std::path::PathBuf,
        expected: &'static str,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not load weights: {0:?}")]
    Recorder(RecorderError),
}

impl From<RecorderError> for DenseNetError {
    fn from(err: RecorderError) -> Self {
        Self::Recorder(err)
    }
}
