use std::path::{Path, PathBuf};

use burn::{
    module::{AutodiffModule, Devices, ModuleMapper, ModuleVisitor},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record},
    tensor::backend::AutodiffBackend,
};

use crate::{
    decoder::{UpsampleDecoder, UpsampleDecoderConfig},
    encoder::densenet::{load_weights_record, DenseNet, DenseNetConfig, DenseNetPreset},
    mask::apply_mask,
    segmentation_head::{SegmentationHead, SegmentationHeadConfig},
    volume::{
        VolumeBottleneck, VolumeNetwork, VolumeNetworkConfig, VolumetricStage,
        VolumetricStageConfig,
    },
    DenseNetError,
};

/// Class count of the ImageNet classifier the pretrained checkpoints ship with.
const IMAGENET_CLASSES: usize = 1000;

/// DenseNet encoder with an additive U-Net decoder and an optional volumetric stage.
///
/// `V` is the injected 3-D sub-network; it is only present when the model was built
/// with [`HybridDenseNetConfig::init_with_volume`].
#[derive(Debug, Clone)]
pub struct HybridDenseNet<B: Backend, V = VolumeBottleneck<B>> {
    pub encoder: DenseNet<B>,
    pub decoder: UpsampleDecoder<B>,
    pub head: Option<SegmentationHead<B>>,
    pub volume: Option<VolumetricStage<B>>,
    pub network: Option<V>,
    name: &'static str,
    classes: usize,
    collapse_axis: bool,
}

impl<B: Backend, V> HybridDenseNet<B, V> {
    /// Names of the graph inputs, in call order.
    pub const INPUTS: [&'static str; 2] = ["image", "mask"];

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn collapse_axis(&self) -> bool {
        self.collapse_axis
    }

    pub fn num_inputs(&self) -> usize {
        Self::INPUTS.len()
    }

    pub fn num_outputs(&self) -> usize {
        1
    }
}

impl<B: Backend, V: VolumeNetwork<Backend = B>> HybridDenseNet<B, V> {
    /// Segment a batch of 2-D images.
    ///
    /// * `image` - `[batch, 1, H, W]`, `H` and `W` multiples of 32
    /// * `mask` - `[batch, 1, H, W]`, nonzero inside the region of interest
    ///
    /// Returns `[batch, classes, H, W]` probabilities, forced to class 0 outside the mask.
    ///
    /// # Panics
    ///
    /// If the model was built with [`HybridDenseNetConfig::init_with_volume`]; the
    /// volumetric stage only runs through [`forward_volume`](Self::forward_volume).
    pub fn forward(&self, image: Tensor<B, 4>, mask: Tensor<B, 4, Int>) -> Tensor<B, 4> {
        let features = self.decoder.forward(self.encoder.forward(image));
        let probs = match &self.head {
            Some(head) => head.forward(features),
            None => panic!("{} has a volumetric stage, use `forward_volume`", self.name),
        };

        apply_mask(probs, mask)
    }

    /// Segment a batch of volumes slice by slice, refining with the volumetric stage if present.
    ///
    /// * `image` - `[batch, 1, S, H, W]`
    /// * `mask` - `[batch, 1, S, H, W]`
    ///
    /// Returns `[batch, classes, S, H, W]`.
    ///
    /// # Panics
    ///
    /// If the model was configured with `collapse_axis` disabled.
    pub fn forward_volume(&self, image: Tensor<B, 5>, mask: Tensor<B, 5, Int>) -> Tensor<B, 5> {
        assert!(
            self.collapse_axis,
            "{} was built without `collapse_axis`, use `forward`",
            self.name
        );
        let [batch, ..] = image.dims();

        let features = self
            .decoder
            .forward(self.encoder.forward(collapse_slices(image.clone())));

        let probs = match (&self.volume, &self.network, &self.head) {
            (Some(stage), Some(network), _) => stage.forward(
                image,
                mask.clone(),
                restore_slices(features, batch),
                network,
            ),
            (_, _, Some(head)) => restore_slices(head.forward(features), batch),
            _ => unreachable!("a model always has either a head or a volumetric stage"),
        };

        apply_mask(probs, mask)
    }
}

/// Fold the slice axis into the batch axis: `[b, c, s, h, w] -> [b * s, c, h, w]`.
pub fn collapse_slices<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 4> {
    let [batch, channels, slices, height, width] = x.dims();
    x.swap_dims(1, 2)
        .reshape([batch * slices, channels, height, width])
}

/// Undo [`collapse_slices`] given the original batch size.
pub fn restore_slices<B: Backend>(x: Tensor<B, 4>, batch: usize) -> Tensor<B, 5> {
    let [folded, channels, height, width] = x.dims();
    x.reshape([batch, folded / batch, channels, height, width])
        .swap_dims(1, 2)
}

// We need to implement everything manually, because [`Module`] proc-macro implementation has unnecessary trait bound for AutodiffModule.
#[derive(Record)]
pub struct HybridDenseNetRecord<B: Backend, V>
where
    V: burn::module::Module<B>,
{
    pub encoder: <DenseNet<B> as burn::module::Module<B>>::Record,
    pub decoder: <UpsampleDecoder<B> as burn::module::Module<B>>::Record,
    pub head: <Option<SegmentationHead<B>> as burn::module::Module<B>>::Record,
    pub volume: <Option<VolumetricStage<B>> as burn::module::Module<B>>::Record,
    pub network: <Option<V> as burn::module::Module<B>>::Record,
}

impl<B: Backend, V: Module<B>> Module<B> for HybridDenseNet<B, V> {
    type Record = HybridDenseNetRecord<B, V>;
    fn load_record(self, record: Self::Record) -> Self {
        Self {
            encoder: Module::<B>::load_record(self.encoder, record.encoder),
            decoder: Module::<B>::load_record(self.decoder, record.decoder),
            head: Module::<B>::load_record(self.head, record.head),
            volume: Module::<B>::load_record(self.volume, record.volume),
            network: Module::<B>::load_record(self.network, record.network),
            ..self
        }
    }
    fn into_record(self) -> Self::Record {
        Self::Record {
            encoder: Module::<B>::into_record(self.encoder),
            decoder: Module::<B>::into_record(self.decoder),
            head: Module::<B>::into_record(self.head),
            volume: Module::<B>::into_record(self.volume),
            network: Module::<B>::into_record(self.network),
        }
    }
    fn num_params(&self) -> usize {
        Module::<B>::num_params(&self.encoder)
            + Module::<B>::num_params(&self.decoder)
            + Module::<B>::num_params(&self.head)
            + Module::<B>::num_params(&self.volume)
            + Module::<B>::num_params(&self.network)
    }
    fn visit<Visitor: ModuleVisitor<B>>(&self, visitor: &mut Visitor) {
        Module::visit(&self.encoder, visitor);
        Module::visit(&self.decoder, visitor);
        Module::visit(&self.head, visitor);
        Module::visit(&self.volume, visitor);
        Module::visit(&self.network, visitor);
    }
    fn map<Mapper: ModuleMapper<B>>(self, mapper: &mut Mapper) -> Self {
        Self {
            encoder: Module::<B>::map(self.encoder, mapper),
            decoder: Module::<B>::map(self.decoder, mapper),
            head: Module::<B>::map(self.head, mapper),
            volume: Module::<B>::map(self.volume, mapper),
            network: Module::<B>::map(self.network, mapper),
            ..self
        }
    }
    fn collect_devices(&self, devices: Devices<B>) -> Devices<B> {
        let devices = Module::<B>::collect_devices(&self.encoder, devices);
        let devices = Module::<B>::collect_devices(&self.decoder, devices);
        let devices = Module::<B>::collect_devices(&self.head, devices);
        let devices = Module::<B>::collect_devices(&self.volume, devices);
        Module::<B>::collect_devices(&self.network, devices)
    }
    fn to_device(self, device: &B::Device) -> Self {
        Self {
            encoder: Module::<B>::to_device(self.encoder, device),
            decoder: Module::<B>::to_device(self.decoder, device),
            head: Module::<B>::to_device(self.head, device),
            volume: Module::<B>::to_device(self.volume, device),
            network: Module::<B>::to_device(self.network, device),
            ..self
        }
    }
    fn fork(self, device: &B::Device) -> Self {
        Self {
            encoder: Module::<B>::fork(self.encoder, device),
            decoder: Module::<B>::fork(self.decoder, device),
            head: Module::<B>::fork(self.head, device),
            volume: Module::<B>::fork(self.volume, device),
            network: Module::<B>::fork(self.network, device),
            ..self
        }
    }
}

impl<B: AutodiffBackend, V: AutodiffModule<B>> AutodiffModule<B> for HybridDenseNet<B, V> {
    type InnerModule = HybridDenseNet<B::InnerBackend, <V as AutodiffModule<B>>::InnerModule>;
    fn valid(&self) -> Self::InnerModule {
        HybridDenseNet {
            encoder: AutodiffModule::<B>::valid(&self.encoder),
            decoder: AutodiffModule::<B>::valid(&self.decoder),
            head: AutodiffModule::<B>::valid(&self.head),
            volume: AutodiffModule::<B>::valid(&self.volume),
            network: AutodiffModule::<B>::valid(&self.network),
            name: self.name,
            classes: self.classes,
            collapse_axis: self.collapse_axis,
        }
    }
}

impl<B: Backend, V: Module<B>> core::fmt::Display for HybridDenseNet<B, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!(
            "{0}[num_params={1}]",
            self.name,
            self.num_params()
        ))
    }
}

/// Where the initial parameters come from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Weights {
    /// Torchvision's ImageNet-1k checkpoint for the matching preset, encoder only.
    ImageNet,
    /// A local file. PyTorch checkpoints (`.pth` / `.pt`) in the torchvision
    /// DenseNet layout are matched onto the encoder by layer name, leaving the
    /// decoder and heads untouched. Anything else is read as a full model record
    /// saved with [`Module::save_file`] and a [`NamedMpkFileRecorder`] at full
    /// precision.
    File(PathBuf),
}

#[derive(Config, Debug)]
pub struct HybridDenseNetConfig {
    /// Dense layers per encoder stage.
    pub blocks: [usize; 4],
    /// Number of segmentation classes.
    pub classes: usize,
    /// Whether the pretrained classifier would be kept. Only constrains `classes`
    /// together with ImageNet weights; the segmentation head always replaces it.
    #[config(default = true)]
    pub include_top: bool,
    /// Fold a leading slice axis into the batch before encoding.
    #[config(default = true)]
    pub collapse_axis: bool,
    pub weights: Option<Weights>,
}

impl HybridDenseNetConfig {
    pub fn from_preset(preset: DenseNetPreset, classes: usize) -> Self {
        Self::new(preset.blocks(), classes)
    }

    pub fn model_name(&self) -> &'static str {
        DenseNetPreset::name_for(self.blocks)
    }

    pub fn encoder_config(&self) -> DenseNetConfig {
        DenseNetConfig::new(self.blocks)
    }

    fn decoder_config(&self) -> UpsampleDecoderConfig {
        let encoder = self.encoder_config();
        UpsampleDecoderConfig::new(
            encoder.out_channels(),
            encoder.skip_channels(),
            encoder.stem_channels(),
        )
    }

    /// Reject invalid combinations before any layer is built.
    pub fn validate(&self, with_volume: bool) -> Result<(), DenseNetError> {
        if self.classes == 0 {
            return Err(DenseNetError::NoClasses);
        }
        if self.weights == Some(Weights::ImageNet) {
            if self.include_top && self.classes != IMAGENET_CLASSES {
                return Err(DenseNetError::ImageNetClasses {
                    classes: self.classes,
                });
            }
            if DenseNetPreset::from_blocks(self.blocks).is_none() {
                return Err(DenseNetError::UnknownPreset {
                    blocks: self.blocks,
                });
            }
        }
        if with_volume && !self.collapse_axis {
            return Err(DenseNetError::VolumeWithoutCollapse);
        }
        Ok(())
    }

    /// Build the 2-D model, with a 1x1 convolution head instead of the volumetric stage.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<HybridDenseNet<B>, DenseNetError> {
        self.validate(false)?;

        let decoder = self.decoder_config();
        let head = SegmentationHeadConfig::new(decoder.out_channels(), self.classes).init(device);

        self.assemble(decoder, Some(head), None, None, device)
    }

    /// Build the model with the volumetric stage wrapped around the network `volume` describes.
    pub fn init_with_volume<B: Backend, VC: VolumeNetworkConfig<B>>(
        &self,
        volume: &VC,
        device: &B::Device,
    ) -> Result<HybridDenseNet<B, VC::Network>, DenseNetError> {
        self.validate(true)?;

        let decoder = self.decoder_config();
        let stage_config =
            VolumetricStageConfig::new(decoder.out_channels(), volume.out_channels(), self.classes);
        let network = volume.init(stage_config.network_in_channels(), device);
        let stage = stage_config.init(device);

        self.assemble(decoder, None, Some(stage), Some(network), device)
    }

    fn assemble<B: Backend, V: Module<B>>(
        &self,
        decoder: UpsampleDecoderConfig,
        head: Option<SegmentationHead<B>>,
        volume: Option<VolumetricStage<B>>,
        network: Option<V>,
        device: &B::Device,
    ) -> Result<HybridDenseNet<B, V>, DenseNetError> {
        let model = HybridDenseNet {
            encoder: self.encoder_config().init(device),
            decoder: decoder.init(device),
            head,
            volume,
            network,
            name: self.model_name(),
            classes: self.classes,
            collapse_axis: self.collapse_axis,
        };
        let model = self.load_weights(model, device)?;
        log::debug!("Assembled {model}");

        Ok(model)
    }

    fn load_weights<B: Backend, V: Module<B>>(
        &self,
        mut model: HybridDenseNet<B, V>,
        device: &B::Device,
    ) -> Result<HybridDenseNet<B, V>, DenseNetError> {
        match &self.weights {
            None => Ok(model),
            Some(Weights::ImageNet) => {
                let preset = DenseNetPreset::from_blocks(self.blocks).ok_or(
                    DenseNetError::UnknownPreset {
                        blocks: self.blocks,
                    },
                )?;
                model.encoder = load_imagenet_encoder(preset, model.encoder, device)?;
                Ok(model)
            }
            Some(Weights::File(path)) if is_torch_checkpoint(path) => {
                log::info!(
                    "Loading {} encoder weights by name from {}",
                    model.name,
                    path.display()
                );
                let record = load_weights_record(path, device)?;
                model.encoder = model.encoder.load_record(record);
                Ok(model)
            }
            Some(Weights::File(path)) => {
                log::info!("Loading {} weights from {}", model.name, path.display());
                let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
                Ok(model.load_file(path.clone(), &recorder, device)?)
            }
        }
    }
}

/// Whether a local weights file is a PyTorch state_dict rather than a Burn record.
fn is_torch_checkpoint(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pth" | "pt")
    )
}

#[cfg(feature = "pretrained")]
fn load_imagenet_encoder<B: Backend>(
    preset: DenseNetPreset,
    encoder: DenseNet<B>,
    device: &B::Device,
) -> Result<DenseNet<B>, DenseNetError> {
    let weights = crate::download(&preset.weights())?;
    let record = load_weights_record(weights, device)?;
    log::info!("Loaded ImageNet weights into the {} encoder", preset.name());

    Ok(encoder.load_record(record))
}

#[cfg(not(feature = "pretrained"))]
fn load_imagenet_encoder<B: Backend>(
    _preset: DenseNetPreset,
    _encoder: DenseNet<B>,
    _device: &B::Device,
) -> Result<DenseNet<B>, DenseNetError> {
    Err(DenseNetError::PretrainedDisabled)
}
