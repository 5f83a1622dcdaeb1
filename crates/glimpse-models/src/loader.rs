use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::VarBuilder;

use crate::{
    action::ActionModel,
    caption::CaptionModel,
    config::{ActionConfig, CaptionConfig},
    device::MODEL_DTYPE,
    error::ModelError,
    vocab::Vocabulary,
};

/// Locations of the persisted artifacts inside a model directory.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    root: PathBuf,
}

impl ModelPaths {
    pub const CAPTION_CONFIG: &'static str = "caption_model_config.json";
    pub const VOCAB: &'static str = "vocab.json";
    pub const CAPTION_WEIGHTS: &'static str = "caption_weights";
    pub const ACTION_CONFIG: &'static str = "action_model_config.json";
    pub const ACTION_WEIGHTS: &'static str = "action_weights";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn caption_config(&self) -> PathBuf {
        self.root.join(Self::CAPTION_CONFIG)
    }

    pub fn vocab(&self) -> PathBuf {
        self.root.join(Self::VOCAB)
    }

    pub fn action_config(&self) -> PathBuf {
        self.root.join(Self::ACTION_CONFIG)
    }

    /// The caption weights, preferring safetensors over a pytorch pickle.
    pub fn caption_weights(&self) -> Result<PathBuf, ModelError> {
        self.weights(Self::CAPTION_WEIGHTS)
    }

    /// The action weights, preferring safetensors over a pytorch pickle.
    pub fn action_weights(&self) -> Result<PathBuf, ModelError> {
        self.weights(Self::ACTION_WEIGHTS)
    }

    fn weights(&self, stem: &str) -> Result<PathBuf, ModelError> {
        ["safetensors", "pth"]
            .iter()
            .map(|ext| self.root.join(format!("{stem}.{ext}")))
            .find(|path| path.exists())
            .ok_or_else(|| {
                ModelError::MissingArtifact(self.root.join(format!("{stem}.safetensors")))
            })
    }
}

/// Open a weights file with the reader matching its extension.
pub fn weights_var_builder(
    path: &Path,
    device: &Device,
) -> Result<VarBuilder<'static>, ModelError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("safetensors") => {
            // SAFETY: the file is not modified while the model is alive
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], MODEL_DTYPE, device)? };
            Ok(vb)
        }
        Some("pth") | Some("pt") => Ok(VarBuilder::from_pth(path, MODEL_DTYPE, device)?),
        _ => Err(ModelError::UnsupportedWeights(path.to_path_buf())),
    }
}

/// Load the captioning model together with its vocabulary.
pub fn load_caption_model(
    paths: &ModelPaths,
    device: &Device,
) -> Result<(CaptionModel, Vocabulary), ModelError> {
    let config = CaptionConfig::from_json_file(paths.caption_config())?;

    let vocab_path = paths.vocab();
    if !vocab_path.exists() {
        return Err(ModelError::MissingArtifact(vocab_path));
    }
    let vocab = Vocabulary::from_json_file(&vocab_path)?;
    if vocab.len() != config.vocab_size {
        log::warn!(
            "vocabulary has {} words but the model was built for {}",
            vocab.len(),
            config.vocab_size
        );
    }

    let weights = paths.caption_weights()?;
    let vb = weights_var_builder(&weights, device)?;
    let model = CaptionModel::new(&config, vb)?;
    log::info!("loaded caption model from {}", weights.display());

    Ok((model, vocab))
}

/// Load the action classifier.
pub fn load_action_model(paths: &ModelPaths, device: &Device) -> Result<ActionModel, ModelError> {
    let config = ActionConfig::from_json_file(paths.action_config())?;

    let weights = paths.action_weights()?;
    let vb = weights_var_builder(&weights, device)?;
    let model = ActionModel::new(&config, vb)?;
    log::info!(
        "loaded action model from {} with {} classes",
        weights.display(),
        config.num_classes
    );

    Ok(model)
}
