mod counter;
mod vectors;

pub use counter::Counter;
pub use vectors::{normal_init, zeros_init, Coverage, Embeddings, VectorSource, Vectors};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which tokens a vocabulary reserves and how it filters the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabConfig {
    pub unk_token: Option<String>,
    pub pad_token: Option<String>,
    pub special_tokens: Vec<Option<String>>,
    pub max_size: Option<usize>,
    pub min_freq: usize,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            unk_token: Some("<unk>".to_string()),
            pad_token: None,
            special_tokens: Vec::new(),
            max_size: None,
            min_freq: 1,
        }
    }
}

impl VocabConfig {
    pub fn with_unk_token(mut self, token: Option<&str>) -> Self {
        self.unk_token = token.map(str::to_string);
        self
    }

    pub fn with_pad_token(mut self, token: Option<&str>) -> Self {
        self.pad_token = token.map(str::to_string);
        self
    }

    pub fn with_special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.special_tokens = tokens.into_iter().map(|token| token.map(Into::into)).collect();
        self
    }

    pub fn with_max_size(mut self, max_size: Option<usize>) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_min_freq(mut self, min_freq: usize) -> Self {
        self.min_freq = min_freq;
        self
    }

    fn reserved(&self) -> impl Iterator<Item = &str> + '_ {
        self.unk_token
            .iter()
            .chain(self.pad_token.iter())
            .chain(self.special_tokens.iter().flatten())
            .map(String::as_str)
    }
}

/// A bijection between tokens and `[0, len)`.
///
/// Reserved tokens take the lowest indices in the order unknown, padding, then
/// specials; every other token follows by descending frequency. A vocabulary is
/// never modified once built; the set operations return new vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocab {
    config: VocabConfig,
    freq: Counter,
    stoi: HashMap<String, usize>,
    itos: Vec<String>,
    unk_index: Option<usize>,
    vectors: Option<Embeddings>,
}

impl Vocab {
    pub fn build(counter: Counter, config: VocabConfig) -> Self {
        let freq = match config.max_size {
            Some(max_size) => counter.truncated(max_size),
            None => counter,
        };

        let mut vocab = Self {
            config,
            freq,
            stoi: HashMap::new(),
            itos: Vec::new(),
            unk_index: None,
            vectors: None,
        };

        let reserved: Vec<String> = vocab.config.reserved().map(str::to_string).collect();
        for token in &reserved {
            vocab.add_token(token);
        }
        vocab.unk_index = vocab.config.unk_token.as_ref().map(|token| vocab.stoi[token]);

        let ranked: Vec<String> = vocab
            .freq
            .most_common(vocab.config.max_size)
            .into_iter()
            .take_while(|&(_, count)| count >= vocab.config.min_freq)
            .map(|(token, _)| token.to_string())
            .collect();
        for token in &ranked {
            vocab.add_token(token);
        }

        vocab
    }

    fn add_token(&mut self, token: &str) -> usize {
        if let Some(&index) = self.stoi.get(token) {
            return index;
        }
        let index = self.itos.len();
        self.stoi.insert(token.to_string(), index);
        self.itos.push(token.to_string());
        index
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn config(&self) -> &VocabConfig {
        &self.config
    }

    pub fn freq(&self) -> &Counter {
        &self.freq
    }

    pub fn itos(&self) -> &[String] {
        &self.itos
    }

    pub fn contains(&self, token: &str) -> bool {
        self.stoi.contains_key(token)
    }

    /// Exact lookup in the forward map, without the unknown-token fallback.
    pub fn get(&self, token: &str) -> Option<usize> {
        self.stoi.get(token).copied()
    }

    /// Index of `token`, falling back to the unknown token when one is reserved.
    pub fn index(&self, token: &str) -> Result<usize> {
        self.get(token)
            .or(self.unk_index)
            .ok_or_else(|| Error::UnknownToken(token.to_string()))
    }

    pub fn token(&self, index: usize) -> Result<&str> {
        self.itos
            .get(index)
            .map(String::as_str)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    pub fn unk_index(&self) -> Option<usize> {
        self.unk_index
    }

    pub fn pad_index(&self) -> Option<usize> {
        self.config.pad_token.as_deref().and_then(|token| self.get(token))
    }

    pub fn vectors(&self) -> Option<&Embeddings> {
        self.vectors.as_ref()
    }

    pub fn vec_dim(&self) -> usize {
        self.vectors.as_ref().map_or(0, Embeddings::dim)
    }

    fn derive(&self, rhs: &Vocab, freq: Counter) -> Result<Vocab> {
        if self.config != rhs.config {
            return Err(Error::ConfigMismatch);
        }
        Ok(Vocab::build(freq, self.config.clone()))
    }

    /// Tokens counted by both vocabularies, with this vocabulary's counts.
    pub fn intersection(&self, rhs: &Vocab) -> Result<Vocab> {
        let freq = self
            .freq
            .iter()
            .filter(|(token, _)| rhs.freq.contains(token))
            .collect();
        self.derive(rhs, freq)
    }

    /// Tokens counted by either vocabulary, with summed counts.
    pub fn union(&self, rhs: &Vocab) -> Result<Vocab> {
        let mut freq = self.freq.clone();
        freq.merge(&rhs.freq);
        self.derive(rhs, freq)
    }

    /// Tokens counted by this vocabulary but not by `rhs`.
    pub fn difference(&self, rhs: &Vocab) -> Result<Vocab> {
        let freq = self
            .freq
            .iter()
            .filter(|(token, _)| !rhs.freq.contains(token))
            .collect();
        self.derive(rhs, freq)
    }

    /// Attaches one vector per index, drawing unresolved rows from `unk_init`.
    ///
    /// The padding row, if any, is zeroed after filling.
    pub fn with_vectors<V, F>(mut self, source: &V, mut unk_init: F) -> (Self, Coverage)
    where
        V: VectorSource + ?Sized,
        F: FnMut(&mut [f32]),
    {
        let mut embeddings = Embeddings::zeros(self.len(), source.dim());
        let mut coverage = Coverage {
            total_tokens: self.freq.len(),
            total_occurrences: self.freq.total(),
            ..Coverage::default()
        };

        for (index, token) in self.itos.iter().enumerate() {
            match source.lookup(token) {
                Some(vector) => {
                    embeddings.row_mut(index).copy_from_slice(vector);
                    if self.freq.contains(token) {
                        coverage.tokens += 1;
                        coverage.occurrences += self.freq.get(token);
                    }
                }
                None => unk_init(embeddings.row_mut(index)),
            }
        }

        if let Some(pad_index) = self.pad_index() {
            embeddings.row_mut(pad_index).fill(0.0);
        }

        self.vectors = Some(embeddings);
        (self, coverage)
    }
}

impl fmt::Display for Vocab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vocab(tok={}", self.len())?;
        if self.vectors.is_some() {
            write!(f, ", dim={}", self.vec_dim())?;
        }
        if let Some(token) = &self.config.unk_token {
            write!(f, ", unk_token='{}'", token)?;
        }
        if let Some(token) = &self.config.pad_token {
            write!(f, ", pad_token='{}'", token)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(tokens: &[&str]) -> Counter {
        let mut counter = Counter::new();
        counter.update(tokens.iter().copied());
        counter
    }

    fn config() -> VocabConfig {
        VocabConfig::default()
            .with_pad_token(Some("<pad>"))
            .with_special_tokens([Some("<bos>"), None, Some("<pad>")])
    }

    #[test]
    fn test_reserved_tokens_come_first() {
        let vocab = Vocab::build(counter(&["b", "a", "b", "c"]), config());

        assert_eq!(vocab.itos(), &["<unk>", "<pad>", "<bos>", "b", "a", "c"]);
        assert_eq!(vocab.unk_index(), Some(0));
        assert_eq!(vocab.pad_index(), Some(1));
    }

    #[test]
    fn test_forward_and_reverse_are_inverse() {
        let vocab = Vocab::build(counter(&["x", "y", "y", "z", "z", "z"]), config());

        for index in 0..vocab.len() {
            let token = vocab.token(index).unwrap();
            assert_eq!(vocab.get(token), Some(index));
        }
        assert!(matches!(
            vocab.token(vocab.len()),
            Err(Error::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_min_freq_and_max_size() {
        let source = counter(&["a", "a", "a", "b", "b", "c", "d", "d"]);

        let vocab = Vocab::build(source.clone(), config().with_min_freq(2));
        assert_eq!(vocab.len(), 3 + 3);
        assert!(!vocab.contains("c"));

        let vocab = Vocab::build(source, config().with_max_size(Some(2)));
        assert_eq!(vocab.len(), 3 + 2);
        assert_eq!(vocab.freq().len(), 2);
        assert!(vocab.contains("a"));
        assert!(vocab.contains("b"));
        assert!(!vocab.contains("d"));
    }

    #[test]
    fn test_unknown_token_fallback() {
        let vocab = Vocab::build(counter(&["a"]), VocabConfig::default());
        assert_eq!(vocab.index("never-seen").unwrap(), 0);
        assert_eq!(vocab.get("never-seen"), None);

        let strict = Vocab::build(counter(&["a"]), VocabConfig::default().with_unk_token(None));
        assert_eq!(strict.index("a").unwrap(), 0);
        assert!(matches!(
            strict.index("never-seen"),
            Err(Error::UnknownToken(token)) if token == "never-seen"
        ));
    }

    #[test]
    fn test_set_algebra() {
        let ca = counter(&["a", "a", "b", "c"]);
        let cb = counter(&["b", "b", "b", "d"]);
        let a = Vocab::build(ca.clone(), config());
        let b = Vocab::build(cb.clone(), config());

        let both = a.intersection(&b).unwrap();
        assert_eq!(both.freq().get("b"), ca.get("b"));
        assert_eq!(both.freq().len(), 1);

        let either = a.union(&b).unwrap();
        for token in ["a", "b", "c", "d"] {
            assert_eq!(either.freq().get(token), ca.get(token) + cb.get(token));
        }

        let only = a.difference(&b).unwrap();
        let tokens: Vec<_> = only.freq().iter().map(|(token, _)| token).collect();
        assert_eq!(tokens, vec!["a", "c"]);

        assert_eq!(a.freq(), &ca);
        assert_eq!(either.config(), a.config());
    }

    #[test]
    fn test_set_algebra_requires_same_config() {
        let a = Vocab::build(counter(&["a"]), config());
        let b = Vocab::build(counter(&["a"]), config().with_min_freq(2));
        assert!(matches!(a.union(&b), Err(Error::ConfigMismatch)));
    }

    #[test]
    fn test_attach_vectors() {
        let vocab = Vocab::build(counter(&["cat", "cat", "dog", "emu"]), config());
        let mut vectors = Vectors::new(2);
        vectors.insert("cat", &[1.0, 2.0]).unwrap();
        vectors.insert("<pad>", &[5.0, 5.0]).unwrap();

        let (vocab, coverage) = vocab.with_vectors(&vectors, |row| row.fill(-1.0));
        let embeddings = vocab.vectors().unwrap();

        assert_eq!(vocab.vec_dim(), 2);
        assert_eq!(embeddings.rows(), vocab.len());
        assert_eq!(embeddings.row(vocab.index("cat").unwrap()), &[1.0, 2.0]);
        assert_eq!(embeddings.row(vocab.index("dog").unwrap()), &[-1.0, -1.0]);
        assert_eq!(embeddings.row(vocab.pad_index().unwrap()), &[0.0, 0.0]);

        assert_eq!(coverage.tokens, 1);
        assert_eq!(coverage.occurrences, 2);
        assert_eq!(coverage.total_tokens, 3);
        assert_eq!(coverage.total_occurrences, 4);
    }

    #[test]
    fn test_json_round_trip() {
        let vocab = Vocab::build(counter(&["a", "b", "b"]), config());
        let json = serde_json::to_string(&vocab).unwrap();
        let restored: Vocab = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, vocab);
    }
}
