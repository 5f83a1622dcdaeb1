use std::path::Path;

use candle_core::Device;
use glimpse_image::Image;
use serde::Serialize;

use crate::{
    action::{predict_action, ActionClassifier, ActionPrediction},
    caption::{generate_caption, CaptionGenerator},
    device::device_label,
    error::ModelError,
    loader::{load_action_model, load_caption_model, ModelPaths},
    vocab::Vocabulary,
};

/// Default number of decoding steps per caption.
pub const DEFAULT_MAX_CAPTION_LENGTH: usize = 30;

/// Which artifacts are available to serve requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelsStatus {
    pub caption_model: bool,
    pub action_model: bool,
    pub vocab: bool,
}

/// Output of running both pipelines on the same image.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedPrediction {
    pub caption: String,
    pub action: ActionPrediction,
}

/// Models, vocabulary and device shared read-only by every request.
///
/// Built once at startup. All methods take `&self` and allocate their own
/// intermediate buffers, so one context can serve concurrent requests.
pub struct InferenceContext {
    caption_model: Box<dyn CaptionGenerator>,
    action_model: Box<dyn ActionClassifier>,
    vocab: Vocabulary,
    device: Device,
    max_caption_length: usize,
}

impl InferenceContext {
    pub fn new(
        caption_model: Box<dyn CaptionGenerator>,
        action_model: Box<dyn ActionClassifier>,
        vocab: Vocabulary,
        device: Device,
    ) -> Self {
        Self {
            caption_model,
            action_model,
            vocab,
            device,
            max_caption_length: DEFAULT_MAX_CAPTION_LENGTH,
        }
    }

    pub fn with_max_caption_length(mut self, max_caption_length: usize) -> Self {
        self.max_caption_length = max_caption_length;
        self
    }

    /// Load every artifact from `model_dir` onto `device`.
    ///
    /// Any missing or malformed artifact is an error; there is no partial context.
    pub fn load(model_dir: impl AsRef<Path>, device: Device) -> Result<Self, ModelError> {
        let paths = ModelPaths::new(model_dir.as_ref());
        log::info!(
            "loading models from {} on {}",
            paths.root().display(),
            device_label(&device)
        );

        let (caption_model, vocab) = load_caption_model(&paths, &device)?;
        let action_model = load_action_model(&paths, &device)?;

        Ok(Self::new(
            Box::new(caption_model),
            Box::new(action_model),
            vocab,
            device,
        ))
    }

    pub fn caption(&self, image: &Image<u8, 3>) -> Result<String, ModelError> {
        generate_caption(
            self.caption_model.as_ref(),
            image,
            &self.vocab,
            &self.device,
            self.max_caption_length,
        )
    }

    pub fn action(&self, image: &Image<u8, 3>) -> Result<ActionPrediction, ModelError> {
        predict_action(self.action_model.as_ref(), image, &self.device)
    }

    /// Run both pipelines; each one preprocesses the image on its own.
    pub fn combined(&self, image: &Image<u8, 3>) -> Result<CombinedPrediction, ModelError> {
        let caption = self.caption(image)?;
        let action = self.action(image)?;
        Ok(CombinedPrediction { caption, action })
    }

    pub fn status(&self) -> ModelsStatus {
        ModelsStatus {
            caption_model: true,
            action_model: true,
            vocab: !self.vocab.is_empty(),
        }
    }

    pub fn models_loaded(&self) -> bool {
        let status = self.status();
        status.caption_model && status.action_model && status.vocab
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }
}
