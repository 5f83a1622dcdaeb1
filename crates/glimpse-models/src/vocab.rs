use std::{collections::HashMap, path::Path};

use serde::Deserialize;

/// Errors raised while building a vocabulary.
#[derive(thiserror::Error, Debug)]
pub enum VocabError {
    #[error("Failed to read the vocabulary file. {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse the vocabulary file. {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Id {id} is assigned to both {first:?} and {second:?}")]
    DuplicateId {
        id: u32,
        first: String,
        second: String,
    },
}

/// On-disk layout of the vocabulary table.
#[derive(Debug, Deserialize)]
struct VocabFile {
    word2idx: HashMap<String, u32>,
    #[serde(default = "default_pad")]
    pad_token: String,
    #[serde(default = "default_start")]
    start_token: String,
    #[serde(default = "default_end")]
    end_token: String,
    #[serde(default = "default_unk")]
    unk_token: String,
}

fn default_pad() -> String {
    Vocabulary::PAD.to_string()
}

fn default_start() -> String {
    Vocabulary::START.to_string()
}

fn default_end() -> String {
    Vocabulary::END.to_string()
}

fn default_unk() -> String {
    Vocabulary::UNK.to_string()
}

/// Bidirectional mapping between caption tokens and integer ids.
///
/// The table is immutable once built. Ids without a registered word decode to
/// the unknown token.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    word_to_id: HashMap<String, u32>,
    id_to_word: HashMap<u32, String>,
    pad_token: String,
    start_token: String,
    end_token: String,
    unk_token: String,
}

impl Vocabulary {
    pub const PAD: &'static str = "<pad>";
    pub const START: &'static str = "<start>";
    pub const END: &'static str = "<end>";
    pub const UNK: &'static str = "<unk>";

    /// Build a vocabulary from a word to id table using the default sentinel tokens.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::DuplicateId`] if two words map to the same id.
    pub fn from_word_to_id(word_to_id: HashMap<String, u32>) -> Result<Self, VocabError> {
        Self::with_sentinels(
            word_to_id,
            Self::PAD.to_string(),
            Self::START.to_string(),
            Self::END.to_string(),
            Self::UNK.to_string(),
        )
    }

    fn with_sentinels(
        word_to_id: HashMap<String, u32>,
        pad_token: String,
        start_token: String,
        end_token: String,
        unk_token: String,
    ) -> Result<Self, VocabError> {
        let mut id_to_word: HashMap<u32, String> = HashMap::with_capacity(word_to_id.len());
        for (word, &id) in word_to_id.iter() {
            if let Some(previous) = id_to_word.insert(id, word.clone()) {
                // keep the error independent of the hash map iteration order
                let (first, second) = if previous < *word {
                    (previous, word.clone())
                } else {
                    (word.clone(), previous)
                };
                return Err(VocabError::DuplicateId { id, first, second });
            }
        }

        Ok(Self {
            word_to_id,
            id_to_word,
            pad_token,
            start_token,
            end_token,
            unk_token,
        })
    }

    /// Load the vocabulary from a JSON file.
    ///
    /// The file holds a `word2idx` object and optionally overrides the sentinel
    /// tokens via `pad_token`, `start_token`, `end_token` and `unk_token`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VocabError> {
        let contents = std::fs::read_to_string(path)?;
        let file: VocabFile = serde_json::from_str(&contents)?;
        Self::with_sentinels(
            file.word2idx,
            file.pad_token,
            file.start_token,
            file.end_token,
            file.unk_token,
        )
    }

    /// Map every id to its word, falling back to the unknown token.
    pub fn decode(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                self.id_to_word
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| self.unk_token.clone())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.word_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_to_id.is_empty()
    }

    pub fn pad_token(&self) -> &str {
        &self.pad_token
    }

    pub fn start_token(&self) -> &str {
        &self.start_token
    }

    pub fn end_token(&self) -> &str {
        &self.end_token
    }

    pub fn unk_token(&self) -> &str {
        &self.unk_token
    }

    /// Whether the word terminates a caption (end or pad).
    pub fn is_terminator(&self, word: &str) -> bool {
        word == self.end_token || word == self.pad_token
    }
}
