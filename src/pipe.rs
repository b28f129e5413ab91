mod batcher;
mod presets;
mod table;

pub use batcher::{PipeBatcher, RowBatcher};
pub use table::Table;

use crate::error::{Error, Result};
use crate::proc::{Context, Proc, Spec};
use crate::value::Value;
use crate::vocab::{Counter, Vocab};
use burn::prelude::Backend;
use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PIPE_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a pipe instance, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(u64);

impl PipeId {
    fn next() -> Self {
        PipeId(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Pre,
    Vocab,
    Post,
    Batch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pre => "pre",
            Stage::Vocab => "vocab",
            Stage::Post => "post",
            Stage::Batch => "batch",
        };
        write!(f, "{}", name)
    }
}

/// Marks that `pipe` already ran `stage` over `column` of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub column: String,
    pub pipe: PipeId,
    pub stage: Stage,
}

/// A store of named columns, each owned by one pipe.
///
/// Completion flags live in the dataset, so a flag is scoped to the dataset that
/// stores it, the column, the pipe and the stage.
pub trait Dataset<B: Backend> {
    fn columns(&self) -> Vec<String>;
    fn owner(&self, column: &str) -> Option<PipeId>;
    fn column(&self, column: &str) -> Option<&[Value<B>]>;
    fn set_column(&mut self, column: &str, values: Vec<Value<B>>);
    fn is_done(&self, key: &StageKey) -> bool;
    fn mark_done(&mut self, key: StageKey);
}

/// Four stages that turn raw column instances into collated batches.
pub struct Pipe<B: Backend> {
    id: PipeId,
    pre: Proc<B>,
    vocab_proc: Proc<B>,
    post: Proc<B>,
    batch: Proc<B>,
    vocab: Option<Vocab>,
    counter: Counter,
}

impl<B: Backend> Pipe<B> {
    /// Builds a pipe from four stage specifications; none may contain an
    /// inheritance marker.
    pub fn new(
        pre: impl Into<Spec<B>>,
        vocab: impl Into<Spec<B>>,
        post: impl Into<Spec<B>>,
        batch: impl Into<Spec<B>>,
    ) -> Result<Self> {
        Ok(Self {
            id: PipeId::next(),
            pre: pre.into().build()?,
            vocab_proc: vocab.into().build()?,
            post: post.into().build()?,
            batch: batch.into().build()?,
            vocab: None,
            counter: Counter::new(),
        })
    }

    /// A pipe that leaves instances and batches untouched.
    pub fn identity() -> Self {
        Self {
            id: PipeId::next(),
            pre: Proc::Identity,
            vocab_proc: Proc::Identity,
            post: Proc::Identity,
            batch: Proc::Identity,
            vocab: None,
            counter: Counter::new(),
        }
    }

    pub fn id(&self) -> PipeId {
        self.id
    }

    pub fn with_pre(mut self, spec: impl Into<Spec<B>>) -> Self {
        self.pre = spec.into().splice(&self.pre);
        self
    }

    pub fn with_vocab(mut self, spec: impl Into<Spec<B>>) -> Self {
        self.vocab_proc = spec.into().splice(&self.vocab_proc);
        self
    }

    pub fn with_post(mut self, spec: impl Into<Spec<B>>) -> Self {
        self.post = spec.into().splice(&self.post);
        self
    }

    pub fn with_batch(mut self, spec: impl Into<Spec<B>>) -> Self {
        self.batch = spec.into().splice(&self.batch);
        self
    }

    pub fn stage(&self, stage: Stage) -> &Proc<B> {
        match stage {
            Stage::Pre => &self.pre,
            Stage::Vocab => &self.vocab_proc,
            Stage::Post => &self.post,
            Stage::Batch => &self.batch,
        }
    }

    pub fn vocab(&self) -> Option<&Vocab> {
        self.vocab.as_ref()
    }

    /// Replaces the vocabulary, e.g. with one shared by several pipes.
    pub fn set_vocab(&mut self, vocab: Vocab) {
        self.vocab = Some(vocab);
    }

    /// Everything the pre stage has counted so far.
    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    fn owned_columns(&self, datasets: &[&mut dyn Dataset<B>]) -> Vec<String> {
        let mut columns = Vec::new();
        for dataset in datasets.iter() {
            for column in dataset.columns() {
                if dataset.owner(&column) == Some(self.id) && !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// Applies `apply` to every instance of every owned column not yet flagged for
    /// `stage`. Nothing is written back unless every column succeeds.
    fn sweep<F>(&self, stage: Stage, datasets: &mut [&mut dyn Dataset<B>], mut apply: F) -> Result<()>
    where
        F: FnMut(&str, Value<B>) -> Result<Value<B>>,
    {
        let mut outputs = Vec::new();
        for (index, dataset) in datasets.iter().enumerate() {
            for column in dataset.columns() {
                if dataset.owner(&column) != Some(self.id) {
                    continue;
                }
                let key = StageKey {
                    column,
                    pipe: self.id,
                    stage,
                };
                if dataset.is_done(&key) {
                    debug!("skipping {} stage of column '{}', already done", stage, key.column);
                    continue;
                }

                let values = dataset.column(&key.column).unwrap_or_default();
                debug!(
                    "running {} stage over column '{}' ({} instance(s))",
                    stage,
                    key.column,
                    values.len()
                );
                let processed = values
                    .iter()
                    .cloned()
                    .map(|value| apply(&key.column, value))
                    .collect::<Result<Vec<_>>>()?;
                outputs.push((index, key, processed));
            }
        }

        for (index, key, values) in outputs {
            datasets[index].set_column(&key.column, values);
            datasets[index].mark_done(key);
        }
        Ok(())
    }

    /// Runs the pre stage over owned columns and returns every count gathered by
    /// this pipe, across all datasets and calls.
    pub fn preprocess(&mut self, datasets: &mut [&mut dyn Dataset<B>]) -> Result<Counter> {
        let mut counter = Counter::new();
        let pre = &self.pre;
        self.sweep(Stage::Pre, datasets, |column, value| {
            pre.apply(value, &mut Context::with_counter(&mut counter).named(column))
        })?;

        self.counter.merge(&counter);
        Ok(self.counter.clone())
    }

    /// Runs the pre stage if needed, then builds and keeps the vocabulary.
    pub fn build_vocab(&mut self, datasets: &mut [&mut dyn Dataset<B>]) -> Result<&Vocab> {
        let counter = self.preprocess(datasets)?;
        let name = self.owned_columns(datasets).join(",");

        let mut ctx = Context::new().named(&name);
        match self.vocab_proc.apply(Value::Counter(counter), &mut ctx)? {
            Value::Vocab(vocab) => Ok(self.vocab.insert(*vocab)),
            other => Err(Error::NotAVocab(other.kind())),
        }
    }

    /// Runs the pre stage if needed, then the post stage with the current vocabulary.
    pub fn postprocess(&mut self, datasets: &mut [&mut dyn Dataset<B>]) -> Result<()> {
        self.preprocess(datasets)?;

        let vocab = self.vocab.as_ref();
        let post = &self.post;
        self.sweep(Stage::Post, datasets, |column, value| {
            post.apply(value, &mut Context::with_vocab(vocab).named(column))
        })
    }

    /// Collates post-processed instances into one batch value.
    pub fn collate(&self, batch: Vec<Value<B>>) -> Result<Value<B>> {
        self.batch
            .apply(Value::List(batch), &mut Context::with_vocab(self.vocab.as_ref()))
    }
}

impl<B: Backend> fmt::Display for Pipe<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipe(")?;
        writeln!(f, "  pre={},", self.pre)?;
        writeln!(f, "  vocab={},", self.vocab_proc)?;
        writeln!(f, "  post={},", self.post)?;
        writeln!(f, "  batch={}", self.batch)?;
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::vocab::{numbering, BuildVocab, UpdateCounter};
    use crate::proc::Process;
    use crate::vocab::VocabConfig;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;
    type V = Value<TestBackend>;

    fn counting_pipe() -> Pipe<TestBackend> {
        Pipe::new(
            Proc::node(UpdateCounter),
            Proc::node(BuildVocab::default()),
            numbering(),
            Spec::none(),
        )
        .unwrap()
    }

    fn sentences(items: &[&[&str]]) -> Vec<V> {
        items.iter().map(|tokens| V::from(tokens.to_vec())).collect()
    }

    struct Fails;

    impl Process<TestBackend> for Fails {
        fn name(&self) -> &'static str {
            "Fails"
        }

        fn apply(&self, value: V, _ctx: &mut Context<'_>) -> Result<V> {
            match value {
                Value::List(ref items) if items.len() > 1 => Err(Error::MissingCounter),
                other => Ok(other),
            }
        }
    }

    #[test]
    fn test_new_rejects_marker() {
        let result = Pipe::<TestBackend>::new(Spec::inherit(), Spec::none(), Spec::none(), Spec::none());
        assert!(matches!(result, Err(Error::MarkerNotAllowed)));
    }

    #[test]
    fn test_preprocess_is_idempotent() {
        let mut pipe = counting_pipe();
        let mut table = Table::new().with_column("words", &pipe, sentences(&[&["a", "b"], &["a"]]));

        let once = pipe.preprocess(&mut [&mut table]).unwrap();
        let twice = pipe.preprocess(&mut [&mut table]).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.get("a"), 2);
    }

    #[test]
    fn test_counter_is_shared_across_columns_and_datasets() {
        let mut pipe = counting_pipe();
        let other = counting_pipe();
        let mut train = Table::new()
            .with_column("premise", &pipe, sentences(&[&["a", "b"]]))
            .with_column("hypothesis", &pipe, sentences(&[&["b", "c"]]))
            .with_column("label", &other, sentences(&[&["z"]]));
        let mut dev = Table::new().with_column("premise", &pipe, sentences(&[&["c", "d"]]));

        let counter = pipe.preprocess(&mut [&mut train, &mut dev]).unwrap();
        assert_eq!(counter.get("b"), 2);
        assert_eq!(counter.get("c"), 2);
        assert_eq!(counter.get("d"), 1);
        assert!(!counter.contains("z"));
    }

    #[test]
    fn test_build_vocab_and_postprocess() {
        let mut pipe = counting_pipe();
        let mut table = Table::new().with_column("words", &pipe, sentences(&[&["x", "y", "y"]]));

        let vocab = pipe.build_vocab(&mut [&mut table]).unwrap();
        assert_eq!(vocab.itos(), &["<unk>", "y", "x"]);

        pipe.postprocess(&mut [&mut table]).unwrap();
        assert_eq!(table.column("words").unwrap()[0], V::from(vec![2i64, 1, 1]));

        pipe.postprocess(&mut [&mut table]).unwrap();
        assert_eq!(table.column("words").unwrap()[0], V::from(vec![2i64, 1, 1]));
    }

    #[test]
    fn test_postprocess_without_vocab_fails_cleanly() {
        let mut pipe = counting_pipe();
        let mut table = Table::new().with_column("words", &pipe, sentences(&[&["x"]]));

        let result = pipe.postprocess(&mut [&mut table]);
        assert!(matches!(result, Err(Error::VocabNotBuilt)));
        assert_eq!(table.column("words").unwrap()[0], V::from(vec!["x"]));

        let key = StageKey {
            column: "words".to_string(),
            pipe: pipe.id(),
            stage: Stage::Post,
        };
        assert!(!table.is_done(&key));
    }

    #[test]
    fn test_vocab_stage_must_produce_a_vocab() {
        let mut pipe = Pipe::<TestBackend>::new(Proc::node(UpdateCounter), Spec::none(), Spec::none(), Spec::none())
            .unwrap();
        let mut table = Table::new().with_column("words", &pipe, sentences(&[&["x"]]));

        let result = pipe.build_vocab(&mut [&mut table]);
        assert!(matches!(result, Err(Error::NotAVocab("counter"))));
    }

    #[test]
    fn test_failed_stage_commits_nothing() {
        let mut pipe = Pipe::<TestBackend>::new(
            Proc::node(UpdateCounter) + Proc::node(Fails),
            Spec::none(),
            Spec::none(),
            Spec::none(),
        )
        .unwrap();
        let mut table = Table::new()
            .with_column("short", &pipe, sentences(&[&["a"]]))
            .with_column("long", &pipe, sentences(&[&["b", "c"]]));

        assert!(pipe.preprocess(&mut [&mut table]).is_err());
        assert!(pipe.counter().is_empty());
        let key = StageKey {
            column: "short".to_string(),
            pipe: pipe.id(),
            stage: Stage::Pre,
        };
        assert!(!table.is_done(&key));
    }

    #[test]
    fn test_override_splices_current_chain() {
        let device = <TestBackend as Backend>::Device::default();
        let pipe = Pipe::<TestBackend>::new(
            Spec::none(),
            Spec::none(),
            Proc::node(crate::proc::batch::ToTensor::new(device)),
            Spec::none(),
        )
        .unwrap()
        .with_pre(Proc::node(UpdateCounter))
        .with_vocab(Proc::node(BuildVocab::new(VocabConfig::default())))
        .with_post(Spec::from(numbering()).then(Spec::inherit()));

        assert_eq!(pipe.stage(Stage::Post).procs().len(), 2);
        assert_eq!(pipe.stage(Stage::Post).to_string(), "Numbering() + ToTensor()");
        assert!(matches!(pipe.stage(Stage::Batch), Proc::Identity));
    }

    #[test]
    fn test_collate_uses_vocab() {
        let device = <TestBackend as Backend>::Device::default();
        let mut pipe = counting_pipe().with_batch(Proc::node(crate::proc::batch::PadSeq::new(
            "<unk>", true, device,
        )));
        let mut table = Table::new().with_column("words", &pipe, sentences(&[&["a", "b"], &["a"]]));
        pipe.build_vocab(&mut [&mut table]).unwrap();
        pipe.postprocess(&mut [&mut table]).unwrap();

        let batch = table.column("words").unwrap().to_vec();
        let Value::Tensor(collated) = pipe.collate(batch).unwrap() else {
            panic!("expected a tensor");
        };
        assert_eq!(collated.dense().unwrap().dims(), vec![2, 2]);
    }
}
