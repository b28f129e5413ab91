use crate::error::{Error, Result};
use crate::vocab::Vocab;
use chrono::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A vocabulary saved together with how it was built.
#[derive(Serialize, Deserialize)]
pub struct VocabRecord {
    timestamp: String,
    source: String,
    tokenizer: String,
    vocab: Vocab,
}

impl VocabRecord {
    pub fn new(source: impl Into<String>, tokenizer: impl Into<String>, vocab: Vocab) -> Self {
        Self {
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            source: source.into(),
            tokenizer: tokenizer.into(),
            vocab,
        }
    }

    pub fn record_path(&self, records_dir: impl AsRef<Path>) -> PathBuf {
        records_dir
            .as_ref()
            .join(format!("vocab_{}.json", self.timestamp))
    }

    pub fn save(&self, records_dir: impl AsRef<Path>) -> Result<PathBuf> {
        fs::create_dir_all(records_dir.as_ref())?;
        let record_path = self.record_path(records_dir);
        let record_str = serde_json::to_string_pretty(self)?;
        fs::write(&record_path, record_str)?;
        info!("saved vocabulary record to {}", record_path.display());
        Ok(record_path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn get_timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn get_source(&self) -> &str {
        &self.source
    }

    pub fn get_tokenizer(&self) -> &str {
        &self.tokenizer
    }

    pub fn get_vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn into_vocab(self) -> Vocab {
        self.vocab
    }
}

/// Every readable record in `records_dir`, newest first.
pub fn list_vocab_records(records_dir: impl AsRef<Path>) -> Result<Vec<VocabRecord>> {
    let mut records = Vec::<VocabRecord>::new();

    for entry in fs::read_dir(records_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            match VocabRecord::load(&path) {
                Ok(record) => records.push(record),
                Err(err) => info!("skipping {}: {}", path.display(), err),
            }
        }
    }

    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
}

/// The record whose timestamp is `timestamp`, or the newest one for `"latest"`.
pub fn find_vocab_record(records_dir: impl AsRef<Path>, timestamp: &str) -> Result<VocabRecord> {
    list_vocab_records(records_dir)?
        .into_iter()
        .find(|record| timestamp == "latest" || record.timestamp == timestamp)
        .ok_or_else(|| Error::RecordNotFound(timestamp.to_string()))
}
