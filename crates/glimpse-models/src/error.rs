use std::path::PathBuf;

use crate::vocab::VocabError;

/// An error type for the models crate.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    CandleError(#[from] candle_core::Error),

    #[error(transparent)]
    ImageError(#[from] glimpse_image::ImageError),

    #[error(transparent)]
    VocabError(#[from] VocabError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing model artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("Unsupported weights format: {0}")]
    UnsupportedWeights(PathBuf),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Model produced no scores")]
    EmptyScores,

    #[error("Model produced NaN or infinite scores")]
    NonFiniteScores,
}
