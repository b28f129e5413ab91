use crate::error::{Error, Result};
use burn::prelude::*;
use burn::tensor::TensorData;
use log::info;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Anything that can resolve a token to a pretrained vector.
pub trait VectorSource {
    fn dim(&self) -> usize;
    fn lookup(&self, token: &str) -> Option<&[f32]>;
}

/// Pretrained vectors held in memory, in the order they were read.
#[derive(Debug, Clone, Default)]
pub struct Vectors {
    dim: usize,
    stoi: HashMap<String, usize>,
    itos: Vec<String>,
    data: Vec<f32>,
}

impl Vectors {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    /// Adds or replaces the vector of `token`. The first vector of an empty,
    /// dimensionless table fixes the dimension.
    pub fn insert(&mut self, token: &str, vector: &[f32]) -> Result<()> {
        if self.dim == 0 && self.is_empty() {
            self.dim = vector.len();
        }
        if vector.len() != self.dim {
            return Err(Error::VectorDim {
                expected: self.dim,
                found: vector.len(),
            });
        }

        match self.stoi.get(token) {
            Some(&index) => {
                self.data[index * self.dim..(index + 1) * self.dim].copy_from_slice(vector);
            }
            None => {
                self.stoi.insert(token.to_string(), self.itos.len());
                self.itos.push(token.to_string());
                self.data.extend_from_slice(vector);
            }
        }
        Ok(())
    }

    /// Reads lines of `token v1 v2 ... vd`, all with the same `d`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut vectors = Vectors::default();
        let mut values = Vec::new();

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(token) = fields.next() else {
                continue;
            };

            values.clear();
            for field in fields {
                let value = field.parse::<f32>().map_err(|err| Error::VectorParse {
                    line: number + 1,
                    reason: err.to_string(),
                })?;
                values.push(value);
            }
            vectors.insert(token, &values)?;
        }

        Ok(vectors)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("loading vectors from {}", path.display());
        let vectors = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!("loaded {} vector(s) of dimension {}", vectors.len(), vectors.dim);
        Ok(vectors)
    }

    /// Writes the table back in the format [`Vectors::from_reader`] reads.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for (index, token) in self.itos.iter().enumerate() {
            write!(writer, "{}", token)?;
            for value in &self.data[index * self.dim..(index + 1) * self.dim] {
                write!(writer, " {}", value)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

impl VectorSource for Vectors {
    fn dim(&self) -> usize {
        self.dim
    }

    fn lookup(&self, token: &str) -> Option<&[f32]> {
        self.stoi
            .get(token)
            .map(|&index| &self.data[index * self.dim..(index + 1) * self.dim])
    }
}

/// A dense row-major matrix with one row per vocabulary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embeddings {
    dim: usize,
    data: Vec<f32>,
}

impl Embeddings {
    pub fn zeros(rows: usize, dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; rows * dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.data.clone(), [self.rows(), self.dim]),
            device,
        )
    }
}

/// How much of a vocabulary a vector source resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coverage {
    pub tokens: usize,
    pub occurrences: usize,
    pub total_tokens: usize,
    pub total_occurrences: usize,
}

impl Coverage {
    pub fn token_ratio(&self) -> f64 {
        self.tokens as f64 / self.total_tokens.max(1) as f64
    }

    pub fn occurrence_ratio(&self) -> f64 {
        self.occurrences as f64 / self.total_occurrences.max(1) as f64
    }
}

/// Fills a row with samples from the standard normal distribution.
pub fn normal_init(row: &mut [f32]) {
    let mut rng = rand::thread_rng();
    for value in row.iter_mut() {
        *value = rng.sample(StandardNormal);
    }
}

pub fn zeros_init(row: &mut [f32]) {
    row.fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{Counter, Vocab, VocabConfig};
    use burn::backend::ndarray::NdArray;
    use std::io::Cursor;

    #[test]
    fn test_read_and_write_vectors() {
        let text = "the 0.1 0.2\ncat 1 -1\n\ndog 0.5 0.5\n";
        let vectors = Vectors::from_reader(Cursor::new(text)).unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors.dim(), 2);
        assert_eq!(vectors.lookup("cat"), Some(&[1.0, -1.0][..]));
        assert_eq!(vectors.lookup("bird"), None);

        let mut written = Vec::new();
        vectors.write_to(&mut written).unwrap();
        let reread = Vectors::from_reader(Cursor::new(written)).unwrap();
        assert_eq!(reread.lookup("the"), vectors.lookup("the"));
        assert_eq!(reread.len(), 3);
    }

    #[test]
    fn test_inconsistent_dimensions() {
        let text = "a 1 2 3\nb 1 2\n";
        let result = Vectors::from_reader(Cursor::new(text));
        assert!(matches!(
            result,
            Err(Error::VectorDim {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_unparsable_value() {
        let result = Vectors::from_reader(Cursor::new("a 1 x\n"));
        assert!(matches!(result, Err(Error::VectorParse { line: 1, .. })));
    }

    #[test]
    fn test_embeddings_to_tensor() {
        let mut counter = Counter::new();
        counter.update(["a", "b", "b"]);
        let config = VocabConfig::default().with_pad_token(Some("<pad>"));
        let vocab = Vocab::build(counter, config);

        let mut vectors = Vectors::new(2);
        vectors.insert("b", &[1.0, 2.0]).unwrap();
        vectors.insert("<pad>", &[9.0, 9.0]).unwrap();
        let (vocab, coverage) = vocab.with_vectors(&vectors, zeros_init);
        assert_eq!(coverage.tokens, 1);

        let tensor = vocab.vectors().unwrap().to_tensor::<NdArray<f32>>(&Default::default());
        assert_eq!(tensor.dims(), [vocab.len(), 2]);

        let rows: Vec<f32> = tensor.into_data().iter::<f32>().collect();
        let row = |token: &str| {
            let index = vocab.index(token).unwrap();
            rows[index * 2..index * 2 + 2].to_vec()
        };
        assert_eq!(row("<pad>"), vec![0.0, 0.0]);
        assert_eq!(row("b"), vec![1.0, 2.0]);
        assert_eq!(row("a"), vec![0.0, 0.0]);
    }

    #[test]
    fn test_coverage_ratios() {
        let coverage = Coverage {
            tokens: 1,
            occurrences: 3,
            total_tokens: 4,
            total_occurrences: 6,
        };
        assert_eq!(coverage.token_ratio(), 0.25);
        assert_eq!(coverage.occurrence_ratio(), 0.5);
        assert_eq!(Coverage::default().token_ratio(), 0.0);
    }
}
