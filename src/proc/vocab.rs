use super::{Context, Proc, Process, Recur};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::vocab::{normal_init, Counter, VectorSource, Vocab, VocabConfig};
use burn::prelude::Backend;
use log::info;
use std::sync::Arc;

/// Counts a token, or every token of a flat sequence, and passes the input on.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateCounter;

impl<B: Backend> Process<B> for UpdateCounter {
    fn name(&self) -> &'static str {
        "UpdateCounter"
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        let counter = ctx.counter()?;
        match &value {
            Value::Str(token) => counter.add(token, 1),
            Value::List(items) | Value::Tuple(items) => {
                let mut tokens = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Str(token) => tokens.push(token.as_str()),
                        other => {
                            return Err(Error::unexpected("UpdateCounter", "a str", other.kind()))
                        }
                    }
                }
                counter.update(tokens);
            }
            other => {
                return Err(Error::unexpected(
                    "UpdateCounter",
                    "a str or a sequence of str",
                    other.kind(),
                ))
            }
        }
        Ok(value)
    }
}

/// Turns the accumulated counter into a vocabulary.
#[derive(Clone, Debug, Default, new)]
pub struct BuildVocab {
    config: VocabConfig,
}

impl<B: Backend> Process<B> for BuildVocab {
    fn name(&self) -> &'static str {
        "BuildVocab"
    }

    fn extra_repr(&self) -> String {
        let max_size = self
            .config
            .max_size
            .map_or_else(|| "inf".to_string(), |max_size| max_size.to_string());
        format!("max_size={}, min_freq={}", max_size, self.config.min_freq)
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        match value {
            Value::Counter(counter) => Ok(Vocab::build(counter, self.config.clone()).into()),
            other => Err(Error::unexpected("BuildVocab", "a counter", other.kind())),
        }
    }
}

fn expect_vocab<B: Backend>(value: Value<B>, node: &'static str) -> Result<Vocab> {
    match value {
        Value::Vocab(vocab) => Ok(*vocab),
        other => Err(Error::unexpected(node, "a vocab", other.kind())),
    }
}

/// Logs frequency statistics of a vocabulary and passes it on.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsVocab;

impl StatsVocab {
    /// The least and the most frequent token; ties go to the first one counted.
    fn extremes(freq: &Counter) -> Option<((&str, usize), (&str, usize))> {
        let min = freq.iter().min_by_key(|&(_, count)| count)?;
        let max = freq.most_common(Some(1)).first().copied()?;
        Some((min, max))
    }

    fn report(name: &str, freq: &Counter) {
        let Some(((tok_min, occ_min), (tok_max, occ_max))) = Self::extremes(freq) else {
            info!("vocabulary '{}' has no tokens", name);
            return;
        };
        let occ_avg = freq.total() as f64 / freq.len().max(1) as f64;

        info!(
            "vocabulary '{}' has {} token(s) => {:.1} occurrence(s)/token [{} :: '{}', {} :: '{}']",
            name,
            freq.len(),
            occ_avg,
            occ_min,
            tok_min,
            occ_max,
            tok_max,
        );
    }
}

impl<B: Backend> Process<B> for StatsVocab {
    fn name(&self) -> &'static str {
        "StatsVocab"
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        let vocab = expect_vocab(value, "StatsVocab")?;
        Self::report(ctx.name(), vocab.freq());
        Ok(vocab.into())
    }
}

/// Maps a token to its index, falling back to the unknown token when reserved.
#[derive(Clone, Copy, Debug, Default)]
pub struct Numbering;

impl<B: Backend> Process<B> for Numbering {
    fn name(&self) -> &'static str {
        "Numbering"
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        match value {
            Value::Str(token) => Ok(Value::from(ctx.vocab()?.index(&token)?)),
            other => Err(Error::unexpected("Numbering", "a str", other.kind())),
        }
    }
}

/// Maps an index back to its token.
#[derive(Clone, Copy, Debug, Default)]
pub struct RevVocab;

impl<B: Backend> Process<B> for RevVocab {
    fn name(&self) -> &'static str {
        "RevVocab"
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        match value {
            Value::Int(index) => {
                let vocab = ctx.vocab()?;
                let index = usize::try_from(index).map_err(|_| Error::NegativeIndex(index))?;
                Ok(Value::from(vocab.token(index)?))
            }
            other => Err(Error::unexpected("RevVocab", "an int", other.kind())),
        }
    }
}

/// Numbers every token inside arbitrarily nested sequences.
pub fn numbering<B: Backend>() -> Proc<B> {
    Proc::Recur(Recur::strings(Proc::node(Numbering)))
}

/// Turns every index inside arbitrarily nested sequences back into a token.
pub fn rev_vocab<B: Backend>() -> Proc<B> {
    Proc::Recur(Recur::ints(Proc::node(RevVocab)))
}

pub type InitFn = dyn Fn(&mut [f32]) + Send + Sync;

/// Attaches pretrained vectors to a vocabulary and logs the coverage.
#[derive(Clone)]
pub struct LoadVectors {
    source: Arc<dyn VectorSource + Send + Sync>,
    unk_init: Arc<InitFn>,
}

impl LoadVectors {
    pub fn new(source: Arc<dyn VectorSource + Send + Sync>) -> Self {
        Self {
            source,
            unk_init: Arc::new(normal_init),
        }
    }

    pub fn with_unk_init<F>(mut self, unk_init: F) -> Self
    where
        F: Fn(&mut [f32]) + Send + Sync + 'static,
    {
        self.unk_init = Arc::new(unk_init);
        self
    }
}

impl<B: Backend> Process<B> for LoadVectors {
    fn name(&self) -> &'static str {
        "LoadVectors"
    }

    fn extra_repr(&self) -> String {
        format!("dim={}", self.source.dim())
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        let vocab = match value {
            Value::Vocab(vocab) => *vocab,
            Value::Counter(_) => return Err(Error::VocabNotBuilt),
            other => return Err(Error::unexpected("LoadVectors", "a vocab", other.kind())),
        };

        let (vocab, coverage) = vocab.with_vectors(self.source.as_ref(), |row| (self.unk_init)(row));
        info!(
            "vectors hit {:.1}% tokens and {:.1}% occurrences of vocabulary '{}'",
            coverage.token_ratio() * 100.0,
            coverage.occurrence_ratio() * 100.0,
            ctx.name(),
        );
        Ok(vocab.into())
    }
}
