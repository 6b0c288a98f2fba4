use super::{weights::PretrainedWeights, DenseNetConfig};

/// Name given to networks whose block configuration matches no preset.
pub const UNKNOWN_NAME: &str = "unique";

/// The three canonical DenseNet depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DenseNetPreset {
    DenseNet121,
    DenseNet169,
    DenseNet201,
}

impl DenseNetPreset {
    pub const ALL: [DenseNetPreset; 3] = [Self::DenseNet121, Self::DenseNet169, Self::DenseNet201];

    pub fn blocks(&self) -> [usize; 4] {
        match self {
            Self::DenseNet121 => [6, 12, 24, 16],
            Self::DenseNet169 => [6, 12, 32, 32],
            Self::DenseNet201 => [6, 12, 48, 32],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DenseNet121 => "densenet121",
            Self::DenseNet169 => "densenet169",
            Self::DenseNet201 => "densenet201",
        }
    }

    pub fn from_blocks(blocks: [usize; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.blocks() == blocks)
    }

    /// Network name for an arbitrary block configuration.
    pub fn name_for(blocks: [usize; 4]) -> &'static str {
        Self::from_blocks(blocks).map_or(UNKNOWN_NAME, |preset| preset.name())
    }

    pub fn encoder_config(&self) -> DenseNetConfig {
        DenseNetConfig::new(self.blocks())
    }

    /// ImageNet-1k checkpoint published for this depth.
    pub fn weights(&self) -> PretrainedWeights {
        match self {
            Self::DenseNet121 => PretrainedWeights {
                url: "https://download.pytorch.org/models/densenet121-a639ec97.pth",
                sha256_prefix: "a639ec97",
            },
            Self::DenseNet169 => PretrainedWeights {
                url: "https://download.pytorch.org/models/densenet169-b2777c0a.pth",
                sha256_prefix: "b2777c0a",
            },
            Self::DenseNet201 => PretrainedWeights {
                url: "https://download.pytorch.org/models/densenet201-c1103571.pth",
                sha256_prefix: "c1103571",
            },
        }
    }
}
