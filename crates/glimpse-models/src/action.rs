use candle_core::{DType, Device, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, Linear, VarBuilder};
use glimpse_image::Image;
use serde::Serialize;

use crate::{
    config::ActionConfig,
    error::ModelError,
    preprocess::preprocess,
    resnet::{BackboneNames, ResNet50, FEATURE_DIM},
    utils::{argmax, softmax},
};

/// Number of entries reported in [`ActionPrediction::all_predictions`].
pub const TOP_K: usize = 5;

const HIDDEN_DIM: usize = 512;

/// A model that scores a preprocessed image against a fixed label set.
pub trait ActionClassifier: Send + Sync {
    /// The labels, in the order of the scores.
    fn class_names(&self) -> &[String];

    /// Unnormalized scores, one per class, for an image [1, 3, 224, 224].
    fn logits(&self, image: &Tensor) -> Result<Vec<f32>, ModelError>;
}

/// One label with its probability in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassProbability {
    #[serde(rename = "class")]
    pub class_name: String,
    pub probability: f32,
}

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPrediction {
    pub predicted_class: String,
    /// Probability of `predicted_class` in percent.
    pub confidence: f32,
    /// At most [`TOP_K`] entries sorted by non-increasing probability.
    pub all_predictions: Vec<ClassProbability>,
}

impl ActionPrediction {
    /// Build a prediction from a probability distribution over `class_names`.
    ///
    /// Ties keep the order of the classes.
    pub fn from_probabilities(
        class_names: &[String],
        probs: &[f32],
    ) -> Result<Self, ModelError> {
        if class_names.len() != probs.len() {
            return Err(ModelError::InvalidConfig(format!(
                "{} class names for {} scores",
                class_names.len(),
                probs.len()
            )));
        }

        let top = argmax(probs)?;

        let mut all_predictions = class_names
            .iter()
            .zip(probs)
            .map(|(class_name, p)| ClassProbability {
                class_name: class_name.clone(),
                probability: p * 100.0,
            })
            .collect::<Vec<_>>();
        // stable, so equal probabilities keep the class order
        all_predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        all_predictions.truncate(TOP_K);

        Ok(Self {
            predicted_class: class_names[top].clone(),
            confidence: probs[top] * 100.0,
            all_predictions,
        })
    }
}

/// Classification head replacing the ResNet fc layer.
#[derive(Debug, Clone)]
struct ActionHead {
    fc1: Linear,
    bn: BatchNorm,
    fc2: Linear,
}

impl ActionHead {
    fn new(num_classes: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        // indices follow the sequential head: dropout, linear, relu, bn, dropout, linear
        Ok(Self {
            fc1: linear(FEATURE_DIM, HIDDEN_DIM, vb.pp(1))?,
            bn: batch_norm(HIDDEN_DIM, 1e-5, vb.pp(3))?,
            fc2: linear(HIDDEN_DIM, num_classes, vb.pp(5))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.apply(&self.fc1)?
            .relu()?
            .apply_t(&self.bn, false)?
            .apply(&self.fc2)
    }
}

/// ResNet-50 action classifier.
#[derive(Debug, Clone)]
pub struct ActionModel {
    backbone: ResNet50,
    head: ActionHead,
    class_names: Vec<String>,
}

impl ActionModel {
    /// Build the model, reading the `backbone.*` weights from `vb`.
    pub fn new(config: &ActionConfig, vb: VarBuilder) -> Result<Self, ModelError> {
        config.validate()?;
        let vb = vb.pp("backbone");
        Ok(Self {
            backbone: ResNet50::new(BackboneNames::TORCHVISION, vb.clone())?,
            head: ActionHead::new(config.num_classes, vb.pp("fc"))?,
            class_names: config.class_names.clone(),
        })
    }

    /// Scores for a batch of images [B, 3, H, W], shape [B, num_classes].
    pub fn forward(&self, images: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.backbone.forward(images)?;
        self.head.forward(&features)
    }
}

impl ActionClassifier for ActionModel {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn logits(&self, image: &Tensor) -> Result<Vec<f32>, ModelError> {
        let logits = self.forward(image)?;
        log::debug!("action logits: {:?}", logits.shape());
        Ok(logits.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

/// Classify the action shown in an rgb8 image.
///
/// # Arguments
///
/// * `model` - The action classifier.
/// * `image` - The rgb8 image with shape [H, W, 3].
/// * `device` - The device the model runs on.
pub fn predict_action<M: ActionClassifier + ?Sized>(
    model: &M,
    image: &Image<u8, 3>,
    device: &Device,
) -> Result<ActionPrediction, ModelError> {
    let image_t = preprocess(image, device)?;
    let logits = model.logits(&image_t)?;
    let probs = softmax(&logits);
    ActionPrediction::from_probabilities(model.class_names(), &probs)
}
