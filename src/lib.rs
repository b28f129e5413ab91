#[macro_use]
extern crate derive_new;

pub mod collate;
pub mod error;
pub mod pipe;
pub mod proc;
pub mod sampler;
pub mod session;
pub mod tokenizer;
pub mod value;
pub mod vocab;

pub use collate::{Collated, Dense, PackedSeq};
pub use error::{Error, Result};
pub use pipe::{Dataset, Pipe, PipeBatcher, PipeId, RowBatcher, Stage, StageKey, Table};
pub use proc::{Context, Entry, Proc, Process, Spec};
pub use sampler::{
    LinearBatchSampler, QuadraticBatchSampler, RandomSampler, Sampler, SequentialSampler, SortishSampler,
};
pub use tokenizer::Tokenizer;
pub use value::{Shape, Value};
pub use vocab::{Counter, Vocab, VocabConfig};
