//! # Glimpse models
//!
//! Image captioning and action recognition networks built on candle.
//!
//! - **Captioning**: a ResNet-50 encoder followed by a stacked LSTM decoder,
//!   decoded greedily into a sentence.
//! - **Action recognition**: a ResNet-50 classifier over a fixed label set,
//!   reported as the top prediction plus the five most likely classes.
//!
//! Both models share the same 224x224 ImageNet preprocessing and are grouped in
//! an [`InferenceContext`] that is loaded once and shared by every request.

/// Action recognition model and prediction post-processing.
pub mod action;

/// Captioning encoder/decoder and greedy decoding.
pub mod caption;

/// Architecture configuration files.
pub mod config;

/// Device selection.
pub mod device;

/// Error types for the models crate.
pub mod error;

/// Loading of configurations, vocabulary and weights from a model directory.
pub mod loader;

/// Image to tensor preprocessing shared by both models.
pub mod preprocess;

/// ResNet-50 trunk shared by both models.
pub mod resnet;

/// The inference context shared across requests.
pub mod service;

/// Host side helpers on score vectors.
pub mod utils;

/// Caption token vocabulary.
pub mod vocab;

pub use crate::action::{predict_action, ActionClassifier, ActionPrediction, ClassProbability};
pub use crate::caption::{generate_caption, CaptionGenerator};
pub use crate::error::ModelError;
pub use crate::service::{CombinedPrediction, InferenceContext, ModelsStatus};
pub use crate::vocab::{VocabError, Vocabulary};
