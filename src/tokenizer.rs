mod character;
mod huggingface;

pub use character::CharTokenizer;
pub use huggingface::HuggingFaceTokenizer;

use crate::error::Result;

/// Splits raw text into string tokens.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;
}

/// Splits on runs of whitespace.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_tokenizer() {
        let tokens = WhitespaceTokenizer.tokenize("  a b\t\nc ").unwrap();
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert!(WhitespaceTokenizer.tokenize("   ").unwrap().is_empty());
    }
}
