use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered class names; the model's output column `i` is `classes()[i]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Reads a postcard-encoded class list.
    ///
    /// # Errors
    ///
    /// [`Error::ArtifactMissing`] if absent, [`Error::ArtifactMalformed`] if
    /// it does not decode or holds no classes.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let encoder: Self =
            postcard::from_bytes(&bytes).map_err(|e| Error::malformed(path, e.to_string()))?;
        if encoder.is_empty() {
            return Err(Error::malformed(path, "label encoder has no classes"));
        }
        Ok(encoder)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes =
            postcard::to_allocvec(self).map_err(|e| Error::malformed(path, e.to_string()))?;
        std::fs::write(path, bytes).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
