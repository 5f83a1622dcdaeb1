use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

fn default_dropout() -> f64 {
    0.5
}

/// Architecture of the captioning encoder/decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub embed_size: usize,
    pub hidden_size: usize,
    pub vocab_size: usize,
    pub num_layers: usize,
    /// Only used during training; kept so the file round-trips.
    #[serde(default = "default_dropout")]
    pub dropout: f64,
}

/// Architecture and label set of the action classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub num_classes: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    pub class_names: Vec<String>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    if !path.exists() {
        return Err(ModelError::MissingArtifact(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

impl CaptionConfig {
    /// Read and validate the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let sizes = [
            ("embed_size", self.embed_size),
            ("hidden_size", self.hidden_size),
            ("vocab_size", self.vocab_size),
            ("num_layers", self.num_layers),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::InvalidConfig(format!("{name} must be positive")));
        }
        Ok(())
    }
}

impl ActionConfig {
    /// Read and validate the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.num_classes == 0 {
            return Err(ModelError::InvalidConfig(
                "num_classes must be positive".to_string(),
            ));
        }
        if self.class_names.len() != self.num_classes {
            return Err(ModelError::InvalidConfig(format!(
                "expected {} class names, found {}",
                self.num_classes,
                self.class_names.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_config_from_json() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("caption_model_config.json");
        std::fs::write(
            &path,
            r#"{"embed_size": 256, "hidden_size": 512, "vocab_size": 5000, "num_layers": 2}"#,
        )?;

        let config = CaptionConfig::from_json_file(&path)?;
        assert_eq!(
            config,
            CaptionConfig {
                embed_size: 256,
                hidden_size: 512,
                vocab_size: 5000,
                num_layers: 2,
                dropout: 0.5,
            }
        );
        Ok(())
    }

    #[test]
    fn caption_config_rejects_zero_layers() {
        let config = CaptionConfig {
            embed_size: 8,
            hidden_size: 8,
            vocab_size: 8,
            num_layers: 0,
            dropout: 0.0,
        };
        assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn action_config_label_count_must_match() {
        let config = ActionConfig {
            num_classes: 3,
            dropout: 0.5,
            class_names: vec!["run".into(), "jump".into()],
        };
        assert!(matches!(config.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn missing_config_file() {
        let res = ActionConfig::from_json_file("/no/such/action_model_config.json");
        assert!(matches!(res, Err(ModelError::MissingArtifact(_))));
    }
}
