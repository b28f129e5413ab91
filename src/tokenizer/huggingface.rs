use super::Tokenizer;
use crate::error::{Error, Result};
use std::path::Path;

/// Subword tokens produced by a `tokenizers` model.
pub struct HuggingFaceTokenizer {
    name: String,
    tokenizer: tokenizers::Tokenizer,
}

impl HuggingFaceTokenizer {
    /// Loads a serialized `tokenizer.json`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = tokenizers::Tokenizer::from_file(path)
            .map_err(|err| Error::Tokenizer(format!("cannot load {}: {}", path.display(), err)))?;
        Ok(Self {
            name: path.display().to_string(),
            tokenizer,
        })
    }

    /// Fetches a pretrained tokenizer, e.g. `gpt2`, from the Hugging Face hub.
    pub fn from_pretrained(identifier: &str) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_pretrained(identifier, None)
            .map_err(|err| Error::Tokenizer(format!("cannot fetch {}: {}", identifier, err)))?;
        Ok(Self {
            name: identifier.to_string(),
            tokenizer,
        })
    }
}

impl Tokenizer for HuggingFaceTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|err| Error::Tokenizer(err.to_string()))?;
        Ok(encoding.get_tokens().to_vec())
    }
}
