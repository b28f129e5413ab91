use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The vocab stage of a pipe finished with something other than a vocabulary.
    #[error("vocabulary building produced `{0}` instead of a vocabulary")]
    NotAVocab(&'static str),

    #[error("vocabulary is not built yet")]
    VocabNotBuilt,

    #[error("no counter is available in this stage")]
    MissingCounter,

    #[error("token `{0}` is not in the vocabulary")]
    UnknownToken(String),

    #[error("index {index} is out of range for a vocabulary of {len} token(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("index {0} is negative")]
    NegativeIndex(i64),

    #[error("example {index} has no size, only {len} size(s) are known")]
    UnknownExample { index: usize, len: usize },

    #[error("sampler yields {sampler} example(s) but {sizes} size(s) are given")]
    SizeMismatch { sizes: usize, sampler: usize },

    #[error("no column named `{0}`")]
    UnknownColumn(String),

    #[error("inheritance marker is not allowed here")]
    MarkerNotAllowed,

    #[error("ragged input: expected length {expected}, found {found}")]
    Ragged { expected: usize, found: usize },

    #[error("{node} expected {expected}, got `{found}`")]
    UnexpectedValue {
        node: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("vocabularies have different configurations")]
    ConfigMismatch,

    #[error("vector dimensions are not consistent, {expected} != {found}")]
    VectorDim { expected: usize, found: usize },

    #[error("invalid vector entry on line {line}: {reason}")]
    VectorParse { line: usize, reason: String },

    #[error("tokenizer failed: {0}")]
    Tokenizer(String),

    #[error("no saved vocabulary matches `{0}`")]
    RecordNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unexpected(node: &'static str, expected: &'static str, found: &'static str) -> Self {
        Error::UnexpectedValue {
            node,
            expected,
            found,
        }
    }
}
