use super::Tokenizer;
use crate::error::Result;

/// Splits text into single characters.
#[derive(Clone, Copy, Debug)]
pub struct CharTokenizer {
    keep_whitespace: bool,
}

impl Default for CharTokenizer {
    fn default() -> Self {
        Self {
            keep_whitespace: true,
        }
    }
}

impl CharTokenizer {
    pub fn new(keep_whitespace: bool) -> Self {
        Self { keep_whitespace }
    }
}

impl Tokenizer for CharTokenizer {
    fn name(&self) -> &str {
        "char"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(text
            .chars()
            .filter(|c| self.keep_whitespace || !c.is_whitespace())
            .map(String::from)
            .collect())
    }
}
