pub use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a vocabulary from a text file and save it
    Vocab {
        /// Text file with one instance per line
        input: PathBuf,

        /// Tokenizer: "whitespace", "char", a tokenizer.json file or a pretrained identifier
        #[arg(short, long, default_value = "whitespace")]
        tokenizer: String,

        /// Minimum frequency for a token to get an index
        #[arg(long, default_value_t = 1)]
        min_freq: usize,

        /// Keep at most this many of the most frequent tokens
        #[arg(long)]
        max_size: Option<usize>,

        /// Unknown token; pass an empty string to reserve none
        #[arg(long, default_value = "<unk>")]
        unk_token: String,

        /// Padding token
        #[arg(long, default_value = "<pad>")]
        pad_token: String,

        /// Pretrained vectors in "token v1 ... vd" text format
        #[arg(long)]
        vectors: Option<PathBuf>,

        /// Directory to store vocabulary records
        #[arg(long, default_value = "vocabs")]
        records_dir: String,
    },

    /// List saved vocabularies
    List {
        /// Directory containing vocabulary records
        #[arg(long, default_value = "vocabs")]
        records_dir: String,
    },

    /// Plan size-bounded batches over a text file and print their statistics
    Batches {
        /// Text file with one instance per line
        input: PathBuf,

        /// Tokenizer used to measure instance sizes
        #[arg(short, long, default_value = "whitespace")]
        tokenizer: String,

        /// Number of examples sorted together
        #[arg(long, default_value_t = 1024)]
        chunk_size: usize,

        /// Maximum number of tokens per batch
        #[arg(short, long, default_value_t = 4096)]
        budget: usize,

        /// Maximum `len * max_size^2` per batch; enables quadratic grouping
        #[arg(long)]
        cost: Option<usize>,

        /// Drop the trailing batch
        #[arg(long, default_value_t = false)]
        drop_last: bool,

        /// Seed for the sampling permutation
        #[arg(long)]
        seed: Option<u64>,

        /// Vocabulary record to collate the first batch with ("latest" or a timestamp)
        #[arg(long)]
        vocab: Option<String>,

        /// Directory containing vocabulary records
        #[arg(long, default_value = "vocabs")]
        records_dir: String,
    },
}
