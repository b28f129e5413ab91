use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use textpipe::proc::text::Tokenize;
use textpipe::proc::vocab::{numbering, BuildVocab, LoadVectors, StatsVocab};
use textpipe::session::{self, VocabRecord};
use textpipe::tokenizer::{CharTokenizer, HuggingFaceTokenizer, WhitespaceTokenizer};
use textpipe::vocab::Vectors;
use textpipe::{
    Dataset, LinearBatchSampler, Pipe, Proc, QuadraticBatchSampler, Sampler, SequentialSampler, SortishSampler,
    Spec, Table, Tokenizer, Value, Vocab, VocabConfig,
};

pub mod cli;

use cli::*;

type Elem = f32;
type Backend = burn::backend::NdArray<Elem>;
type Device = burn::tensor::Device<Backend>;

const COLUMN: &str = "text";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let device = Device::default();

    match cli.command {
        Commands::Vocab {
            input,
            tokenizer,
            min_freq,
            max_size,
            unk_token,
            pad_token,
            vectors,
            records_dir,
        } => {
            let tokenizer = load_tokenizer(&tokenizer)?;
            let unk_token = (!unk_token.is_empty()).then_some(unk_token.as_str());
            let config = VocabConfig::default()
                .with_unk_token(unk_token)
                .with_pad_token(Some(pad_token.as_str()))
                .with_min_freq(min_freq)
                .with_max_size(max_size);

            let vocab = build_vocab(&input, tokenizer.clone(), config, vectors.as_deref(), &device)?;
            let record = VocabRecord::new(input.display().to_string(), tokenizer.name(), vocab);
            let path = record.save(&records_dir)?;

            println!("\nVocabulary built:");
            println!("{}", "-".repeat(60));
            println!("  Tokens:     {}", record.get_vocab().len());
            println!("  Counted:    {}", record.get_vocab().freq().total());
            println!("  Vector dim: {}", record.get_vocab().vec_dim());
            println!("  Saved to:   {}", path.display());
            println!("{}", "-".repeat(60));
        }

        Commands::List { records_dir } => match session::list_vocab_records(&records_dir) {
            Ok(records) => {
                println!("\nSaved vocabularies:");
                if records.is_empty() {
                    println!("No vocabularies found.");
                } else {
                    println!(
                        "{:<20} {:<10} {:<8} {:<8} {:<16} {:<30}",
                        "Timestamp", "Tokens", "MinFreq", "VecDim", "Tokenizer", "Source"
                    );
                    println!("{}", "-".repeat(96));

                    for record in records {
                        let vocab = record.get_vocab();
                        println!(
                            "{:<20} {:<10} {:<8} {:<8} {:<16} {:<30}",
                            record.get_timestamp(),
                            vocab.len(),
                            vocab.config().min_freq,
                            vocab.vec_dim(),
                            record.get_tokenizer(),
                            record.get_source(),
                        );
                    }
                }
            }
            Err(e) => {
                println!("Error reading vocabularies from directory: {}", e);
                return Err(Box::new(e));
            }
        },

        Commands::Batches {
            input,
            tokenizer,
            chunk_size,
            budget,
            cost,
            drop_last,
            seed,
            vocab,
            records_dir,
        } => {
            let vocab = vocab
                .map(|timestamp| session::find_vocab_record(&records_dir, &timestamp))
                .transpose()?
                .map(VocabRecord::into_vocab);
            let tokenizer = load_tokenizer(&tokenizer)?;

            plan_batches(
                &input, tokenizer, chunk_size, budget, cost, drop_last, seed, vocab, &device,
            )?;
        }
    }
    Ok(())
}

fn load_tokenizer(name: &str) -> textpipe::Result<Arc<dyn Tokenizer>> {
    let tokenizer: Arc<dyn Tokenizer> = match name {
        "whitespace" => Arc::new(WhitespaceTokenizer),
        "char" => Arc::new(CharTokenizer::default()),
        path if Path::new(path).is_file() => Arc::new(HuggingFaceTokenizer::from_file(path)?),
        identifier => Arc::new(HuggingFaceTokenizer::from_pretrained(identifier)?),
    };
    info!("using {} tokenizer", tokenizer.name());
    Ok(tokenizer)
}

fn read_lines(path: &Path) -> std::io::Result<Vec<Value<Backend>>> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<Value<Backend>> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(Value::from)
        .collect();
    info!("read {} instance(s) from {}", lines.len(), path.display());
    Ok(lines)
}

fn tokenized(tokenizer: Arc<dyn Tokenizer>) -> Spec<Backend> {
    Spec::from(Proc::node(Tokenize::new(tokenizer))).then(Spec::inherit())
}

fn build_vocab(
    input: &Path,
    tokenizer: Arc<dyn Tokenizer>,
    config: VocabConfig,
    vectors: Option<&Path>,
    device: &Device,
) -> textpipe::Result<Vocab> {
    let pad_token = config.pad_token.clone().unwrap_or_default();
    let mut pipe = Pipe::<Backend>::padded_seq(device, config.unk_token.as_deref(), &pad_token, true)
        .with_pre(tokenized(tokenizer))
        .with_vocab(Proc::node(BuildVocab::new(config)) + Proc::node(StatsVocab));

    if let Some(path) = vectors {
        let vectors = Vectors::from_path(path)?;
        pipe = pipe.with_vocab(Spec::inherit().then(Proc::node(LoadVectors::new(Arc::new(vectors)))));
    }
    info!("{}", pipe);

    let mut table = Table::new().with_column(COLUMN, &pipe, read_lines(input)?);
    let vocab = pipe.build_vocab(&mut [&mut table])?;
    info!("built {}", vocab);
    Ok(vocab.clone())
}

#[allow(clippy::too_many_arguments)]
fn plan_batches(
    input: &Path,
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    budget: usize,
    cost: Option<usize>,
    drop_last: bool,
    seed: Option<u64>,
    vocab: Option<Vocab>,
    device: &Device,
) -> Result<(), Box<dyn std::error::Error>> {
    let pad = vocab.as_ref().and_then(Vocab::pad_index).unwrap_or(0) as i64;
    let mut pipe = Pipe::<Backend>::padded_raw_tensor(device, pad, true)
        .with_pre(Proc::node(Tokenize::new(tokenizer)))
        .with_post(Spec::from(numbering()).then(Spec::inherit()));

    let mut table = Table::new().with_column(COLUMN, &pipe, read_lines(input)?);
    pipe.preprocess(&mut [&mut table])?;
    let sizes = table.sizes(COLUMN)?;
    let n = sizes.len();

    let sampler = SortishSampler::new(sizes.clone(), chunk_size);
    let order: Vec<usize> = match seed {
        Some(seed) => sampler.iter_with(&mut StdRng::seed_from_u64(seed)).collect(),
        None => sampler.sample().collect(),
    };

    let batches: Vec<Vec<usize>> = match cost {
        Some(cost) => {
            QuadraticBatchSampler::new(sizes.clone(), SequentialSampler::new(n), budget, cost, drop_last)?
                .batches(order)
                .collect::<textpipe::Result<_>>()?
        }
        None => LinearBatchSampler::new(sizes.clone(), SequentialSampler::new(n), budget, drop_last)?
            .batches(order)
            .collect::<textpipe::Result<_>>()?,
    };

    let tokens: usize = batches.iter().flatten().map(|&index| sizes[index]).sum();
    let padded: usize = batches
        .iter()
        .map(|batch| batch.len() * batch.iter().map(|&index| sizes[index]).max().unwrap_or(0))
        .sum();
    let examples: Vec<usize> = batches.iter().map(Vec::len).collect();

    println!("\nBatch plan:");
    println!("{}", "-".repeat(60));
    println!("  Instances:       {}", n);
    println!("  Batches:         {}", batches.len());
    println!(
        "  Examples/batch:  min {} / avg {:.1} / max {}",
        examples.iter().min().unwrap_or(&0),
        examples.iter().sum::<usize>() as f64 / examples.len().max(1) as f64,
        examples.iter().max().unwrap_or(&0),
    );
    println!("  Tokens/batch:    {:.1}", tokens as f64 / batches.len().max(1) as f64);
    println!(
        "  Padding:         {:.1}%",
        (1.0 - tokens as f64 / padded.max(1) as f64) * 100.0
    );

    if let Some(vocab) = vocab {
        pipe.set_vocab(vocab);
        pipe.postprocess(&mut [&mut table])?;

        if let Some(first) = batches.first() {
            let column = table.column(COLUMN).unwrap_or_default();
            let items = first.iter().map(|&index| column[index].clone()).collect();
            if let Value::Tensor(collated) = pipe.collate(items)? {
                if let Some(dense) = collated.dense() {
                    println!("  First batch:     {} tensor {:?}", dense.kind(), dense.dims());
                }
            }
        }
    }
    println!("{}", "-".repeat(60));
    Ok(())
}
