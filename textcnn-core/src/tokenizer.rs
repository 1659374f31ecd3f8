//! Word-level tokenizer fitted during training.
//!
//! Reads the JSON layout written by Keras' `Tokenizer.to_json()`:
//! `{"class_name": "Tokenizer", "config": {...}}`. Training scripts usually
//! `json.dump` that string again, so the file may hold the object itself or a
//! string containing it. Inside `config`, `word_index` and `index_word` are
//! themselves JSON-encoded strings.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

#[derive(Deserialize)]
struct TokenizerJson {
    #[serde(default)]
    class_name: Option<String>,
    config: TokenizerConfig,
}

#[derive(Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    num_words: Option<usize>,
    #[serde(default = "default_filters")]
    filters: String,
    #[serde(default = "default_true")]
    lower: bool,
    #[serde(default = "default_split")]
    split: String,
    #[serde(default)]
    char_level: bool,
    #[serde(default)]
    oov_token: Option<String>,
    word_index: Value,
    #[serde(default)]
    index_word: Option<Value>,
}

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_split() -> String {
    " ".to_string()
}

/// Decodes a field that may be either a JSON value or a string holding JSON.
fn embedded<T: serde::de::DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    match value {
        Value::String(raw) => serde_json::from_str(&raw),
        other => serde_json::from_value(other),
    }
}

/// Maps words to integer ids and back.
///
/// Id 0 is reserved for padding and never assigned to a word.
#[derive(Clone, Debug)]
pub struct InputTokenizer {
    word_index: HashMap<String, usize>,
    index_word: HashMap<usize, String>,
    num_words: Option<usize>,
    filters: String,
    lower: bool,
    split: String,
    char_level: bool,
    oov_token: Option<String>,
}

impl InputTokenizer {
    /// Builds a tokenizer from a vocabulary listed in id order starting at 1.
    pub fn from_vocab<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let word_index: HashMap<String, usize> = words
            .into_iter()
            .enumerate()
            .map(|(i, w)| (w.into(), i + 1))
            .collect();
        let index_word = word_index.iter().map(|(w, &i)| (i, w.clone())).collect();
        Self {
            word_index,
            index_word,
            num_words: None,
            filters: default_filters(),
            lower: true,
            split: default_split(),
            char_level: false,
            oov_token: None,
        }
    }

    /// Sets the out-of-vocabulary token, adding it to the vocabulary if absent.
    pub fn with_oov_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if !self.word_index.contains_key(&token) {
            let id = self.word_index.len() + 1;
            self.word_index.insert(token.clone(), id);
            self.index_word.insert(id, token.clone());
        }
        self.oov_token = Some(token);
        self
    }

    pub fn with_num_words(mut self, num_words: Option<usize>) -> Self {
        self.num_words = num_words;
        self
    }

    /// Parses a Keras tokenizer JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Err(reason)` if the document is not a tokenizer.
    pub fn from_json_str(raw: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let doc: TokenizerJson = embedded(value).map_err(|e| e.to_string())?;
        if let Some(class) = doc.class_name.as_deref() {
            if class != "Tokenizer" {
                return Err(format!("expected a Tokenizer, found {class}"));
            }
        }
        let config = doc.config;
        let word_index: HashMap<String, usize> =
            embedded(config.word_index).map_err(|e| format!("word_index: {e}"))?;
        let index_word = match config.index_word {
            Some(value) => {
                let raw: HashMap<String, String> =
                    embedded(value).map_err(|e| format!("index_word: {e}"))?;
                raw.into_iter()
                    .map(|(k, w)| {
                        k.parse::<usize>()
                            .map(|i| (i, w))
                            .map_err(|e| format!("index_word key {k:?}: {e}"))
                    })
                    .collect::<std::result::Result<HashMap<_, _>, _>>()?
            }
            None => word_index.iter().map(|(w, &i)| (i, w.clone())).collect(),
        };
        Ok(Self {
            word_index,
            index_word,
            num_words: config.num_words,
            filters: config.filters,
            lower: config.lower,
            split: config.split,
            char_level: config.char_level,
            oov_token: config.oov_token,
        })
    }

    /// Serializes into the Keras layout, with nested maps JSON-encoded.
    pub fn to_json_string(&self) -> String {
        let index_word: HashMap<String, &String> = self
            .index_word
            .iter()
            .map(|(i, w)| (i.to_string(), w))
            .collect();
        let doc = serde_json::json!({
            "class_name": "Tokenizer",
            "config": {
                "num_words": self.num_words,
                "filters": self.filters,
                "lower": self.lower,
                "split": self.split,
                "char_level": self.char_level,
                "oov_token": self.oov_token,
                "word_index": serde_json::to_string(&self.word_index).unwrap_or_default(),
                "index_word": serde_json::to_string(&index_word).unwrap_or_default(),
            }
        });
        doc.to_string()
    }

    /// Reads a tokenizer file.
    ///
    /// # Errors
    ///
    /// [`Error::ArtifactMissing`] if absent, [`Error::ArtifactMalformed`] if
    /// it cannot be decoded.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&raw).map_err(|reason| Error::malformed(path, reason))
    }

    /// Writes the tokenizer the way training does: a JSON string holding the
    /// document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = Value::String(self.to_json_string()).to_string();
        std::fs::write(path, encoded).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Embedding rows needed for this vocabulary; id 0 is padding.
    pub fn vocab_size(&self) -> usize {
        self.word_index.len() + 1
    }

    fn oov_index(&self) -> Option<usize> {
        self.oov_token
            .as_ref()
            .and_then(|t| self.word_index.get(t).copied())
    }

    /// Splits raw text into the units that are looked up in the vocabulary.
    pub fn words(&self, text: &str) -> Vec<String> {
        let text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.char_level {
            return text.chars().map(String::from).collect();
        }
        let translated: String = text
            .chars()
            .map(|c| {
                if self.filters.contains(c) {
                    self.split.clone()
                } else {
                    c.to_string()
                }
            })
            .collect();
        translated
            .split(self.split.as_str())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn text_to_sequence(&self, text: &str) -> Vec<usize> {
        let oov = self.oov_index();
        self.words(text)
            .iter()
            .filter_map(|word| match self.word_index.get(word) {
                Some(&i) if self.num_words.is_some_and(|n| i >= n) => oov,
                Some(&i) => Some(i),
                None => oov,
            })
            .collect()
    }

    pub fn texts_to_sequences<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<usize>> {
        texts
            .iter()
            .map(|t| self.text_to_sequence(t.as_ref()))
            .collect()
    }

    /// Maps ids back to words, joined by single spaces.
    ///
    /// Ids without a word (padding included) are dropped unless an OOV token
    /// is configured.
    pub fn sequence_to_text(&self, sequence: &[usize]) -> String {
        let oov_word = self.oov_index().and_then(|i| self.index_word.get(&i));
        sequence
            .iter()
            .filter_map(|id| match self.index_word.get(id) {
                Some(_) if self.num_words.is_some_and(|n| *id >= n) => oov_word,
                Some(word) => Some(word),
                None => oov_word,
            })
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn sequences_to_texts(&self, sequences: &[Vec<usize>]) -> Vec<String> {
        sequences
            .iter()
            .map(|s| self.sequence_to_text(s))
            .collect()
    }
}
