use crate::error::{Error, Result};
use crate::value::Value;
use burn::prelude::*;
use burn::tensor::TensorData;

/// A dense integer (or mask) tensor of rank one to three.
#[derive(Debug, Clone)]
pub enum Dense<B: Backend> {
    Vector(Tensor<B, 1, Int>),
    Matrix(Tensor<B, 2, Int>),
    Cube(Tensor<B, 3, Int>),
    Mask(Tensor<B, 2, Bool>),
}

/// Variable-length sequences stored time-major without padding.
///
/// Sequences are ordered by descending length (`sorted_indices`), and
/// `batch_sizes[t]` counts the sequences that are longer than `t`.
#[derive(Debug, Clone)]
pub struct PackedSeq<B: Backend> {
    pub data: Tensor<B, 1, Int>,
    pub batch_sizes: Vec<usize>,
    pub sorted_indices: Vec<usize>,
    pub unsorted_indices: Vec<usize>,
}

/// The output of a batch stage: either a plain tensor or a packed one.
#[derive(Debug, Clone)]
pub enum Collated<B: Backend> {
    Plain(Dense<B>),
    Packed(PackedSeq<B>),
}

impl<B: Backend> Dense<B> {
    pub fn kind(&self) -> &'static str {
        match self {
            Dense::Vector(_) => "vector",
            Dense::Matrix(_) => "matrix",
            Dense::Cube(_) => "cube",
            Dense::Mask(_) => "mask",
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Dense::Vector(t) => t.dims().to_vec(),
            Dense::Matrix(t) => t.dims().to_vec(),
            Dense::Cube(t) => t.dims().to_vec(),
            Dense::Mask(t) => t.dims().to_vec(),
        }
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        match self {
            Dense::Vector(t) => Dense::Vector(t.to_device(device)),
            Dense::Matrix(t) => Dense::Matrix(t.to_device(device)),
            Dense::Cube(t) => Dense::Cube(t.to_device(device)),
            Dense::Mask(t) => Dense::Mask(t.to_device(device)),
        }
    }

    /// Casts an integer tensor to a mask, true wherever the value is non-zero.
    pub fn into_mask(self) -> Result<Self> {
        match self {
            Dense::Matrix(t) => Ok(Dense::Mask(t.equal_elem(0).bool_not())),
            Dense::Mask(t) => Ok(Dense::Mask(t)),
            other => Err(Error::unexpected("ToMask", "a matrix", other.kind())),
        }
    }

    pub fn to_data(&self) -> TensorData {
        match self {
            Dense::Vector(t) => t.to_data(),
            Dense::Matrix(t) => t.to_data(),
            Dense::Cube(t) => t.to_data(),
            Dense::Mask(t) => t.to_data(),
        }
    }
}

impl<B: Backend> PartialEq for Dense<B> {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.to_data() == other.to_data()
    }
}

impl<B: Backend> PackedSeq<B> {
    pub fn pack(rows: Vec<Vec<i64>>, device: &B::Device) -> Self {
        let mut sorted_indices: Vec<usize> = (0..rows.len()).collect();
        sorted_indices.sort_by(|&a, &b| rows[b].len().cmp(&rows[a].len()));

        let mut unsorted_indices = vec![0; rows.len()];
        for (position, &index) in sorted_indices.iter().enumerate() {
            unsorted_indices[index] = position;
        }

        let max_len = sorted_indices.first().map_or(0, |&index| rows[index].len());
        let mut data = Vec::with_capacity(rows.iter().map(Vec::len).sum());
        let mut batch_sizes = Vec::with_capacity(max_len);
        for step in 0..max_len {
            let mut batch_size = 0;
            for &index in &sorted_indices {
                match rows[index].get(step) {
                    Some(&token) => data.push(token),
                    None => break,
                }
                batch_size += 1;
            }
            batch_sizes.push(batch_size);
        }

        let len = data.len();
        Self {
            data: Tensor::from_data(TensorData::new(data, [len]), device),
            batch_sizes,
            sorted_indices,
            unsorted_indices,
        }
    }

    /// The first time step of every sequence.
    pub fn head(&self) -> Tensor<B, 1, Int> {
        let width = self.batch_sizes.first().copied().unwrap_or(0);
        self.data.clone().slice([0..width])
    }

    /// Adds a new first time step filled with `value` to every sequence.
    pub fn prepend(self, value: i64) -> Self {
        let width = self.batch_sizes.first().copied().unwrap_or(0);
        let device = self.data.device();
        let head = Tensor::<B, 1, Int>::full([width], value, &device);

        let mut batch_sizes = Vec::with_capacity(self.batch_sizes.len() + 1);
        batch_sizes.push(width);
        batch_sizes.extend_from_slice(&self.batch_sizes);

        Self {
            data: Tensor::cat(vec![head, self.data], 0),
            batch_sizes,
            ..self
        }
    }
}

impl<B: Backend> PartialEq for PackedSeq<B> {
    fn eq(&self, other: &Self) -> bool {
        self.batch_sizes == other.batch_sizes
            && self.sorted_indices == other.sorted_indices
            && self.data.to_data() == other.data.to_data()
    }
}

impl<B: Backend> Collated<B> {
    /// Applies `f` to the underlying dense data of a plain or packed value.
    pub fn map_dense<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(Dense<B>) -> Result<Dense<B>>,
    {
        match self {
            Collated::Plain(dense) => f(dense).map(Collated::Plain),
            Collated::Packed(packed) => match f(Dense::Vector(packed.data))? {
                Dense::Vector(data) => Ok(Collated::Packed(PackedSeq { data, ..packed })),
                other => Err(Error::unexpected("PackedSeq", "a vector", other.kind())),
            },
        }
    }

    pub fn dense(&self) -> Option<&Dense<B>> {
        match self {
            Collated::Plain(dense) => Some(dense),
            Collated::Packed(_) => None,
        }
    }

    pub fn packed(&self) -> Option<&PackedSeq<B>> {
        match self {
            Collated::Plain(_) => None,
            Collated::Packed(packed) => Some(packed),
        }
    }
}

impl<B: Backend> PartialEq for Collated<B> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Collated::Plain(a), Collated::Plain(b)) => a == b,
            (Collated::Packed(a), Collated::Packed(b)) => a == b,
            _ => false,
        }
    }
}

fn int_of<B: Backend>(value: Value<B>, node: &'static str) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Bool(b) => Ok(b as i64),
        other => Err(Error::unexpected(node, "an int", other.kind())),
    }
}

/// Reads one integer sequence from a list of ints or a rank-1 tensor.
pub(crate) fn int_row<B: Backend>(value: Value<B>, node: &'static str) -> Result<Vec<i64>> {
    match value {
        Value::List(items) | Value::Tuple(items) => {
            items.into_iter().map(|item| int_of(item, node)).collect()
        }
        Value::Tensor(Collated::Plain(Dense::Vector(t))) => Ok(t.into_data().iter::<i64>().collect()),
        other => Err(Error::unexpected(node, "a sequence of ints", other.kind())),
    }
}

/// Reads a list of integer sequences from nested lists or a rank-2 tensor.
pub(crate) fn int_rows<B: Backend>(value: Value<B>, node: &'static str) -> Result<Vec<Vec<i64>>> {
    match value {
        Value::Tensor(Collated::Plain(Dense::Matrix(t))) => {
            let [height, width] = t.dims();
            let flat: Vec<i64> = t.into_data().iter::<i64>().collect();
            Ok((0..height)
                .map(|row| flat[row * width..(row + 1) * width].to_vec())
                .collect())
        }
        other => other
            .into_items(node)?
            .into_iter()
            .map(|row| int_row(row, node))
            .collect(),
    }
}

fn uniform(lens: impl IntoIterator<Item = usize>) -> Result<usize> {
    let mut lens = lens.into_iter();
    let Some(expected) = lens.next() else {
        return Ok(0);
    };
    match lens.find(|&found| found != expected) {
        Some(found) => Err(Error::Ragged { expected, found }),
        None => Ok(expected),
    }
}

fn uniform_width(rows: &[Vec<i64>]) -> Result<usize> {
    uniform(rows.iter().map(Vec::len))
}

/// Nesting depth measured along first elements.
fn depth<B: Backend>(value: &Value<B>) -> usize {
    match value {
        Value::List(items) | Value::Tuple(items) => 1 + items.first().map_or(0, depth),
        _ => 0,
    }
}

pub fn vector<B: Backend>(row: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = row.len();
    Tensor::from_data(TensorData::new(row, [len]), device)
}

/// Stacks equally long rows into a matrix.
pub fn matrix<B: Backend>(rows: Vec<Vec<i64>>, device: &B::Device) -> Result<Tensor<B, 2, Int>> {
    let width = uniform_width(&rows)?;
    let height = rows.len();
    let data: Vec<i64> = rows.into_iter().flatten().collect();
    Ok(Tensor::from_data(TensorData::new(data, [height, width]), device))
}

/// Pads rows to the longest one.
pub fn pad_rows<B: Backend>(rows: Vec<Vec<i64>>, pad: i64, device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let height = rows.len();
    let mut data = vec![pad; height * width];
    for (index, row) in rows.into_iter().enumerate() {
        let start = index * width;
        data[start..start + row.len()].copy_from_slice(&row);
    }
    Tensor::from_data(TensorData::new(data, [height, width]), device)
}

/// Pads a batch of row lists to `[batch, longest list, longest row]`.
pub fn pad_cube<B: Backend>(
    batch: Vec<Vec<Vec<i64>>>,
    pad: i64,
    device: &B::Device,
) -> Tensor<B, 3, Int> {
    let dim0 = batch.len();
    let dim1 = batch.iter().map(Vec::len).max().unwrap_or(0);
    let dim2 = batch
        .iter()
        .flat_map(|rows| rows.iter().map(Vec::len))
        .max()
        .unwrap_or(0);

    let mut data = vec![pad; dim0 * dim1 * dim2];
    for (i, rows) in batch.into_iter().enumerate() {
        for (j, row) in rows.into_iter().enumerate() {
            let start = (i * dim1 + j) * dim2;
            data[start..start + row.len()].copy_from_slice(&row);
        }
    }
    Tensor::from_data(TensorData::new(data, [dim0, dim1, dim2]), device)
}

/// Converts an int, a list of ints, or rectangular nested lists into a dense tensor.
pub fn to_dense<B: Backend>(value: Value<B>, device: &B::Device) -> Result<Dense<B>> {
    const NODE: &str = "ToTensor";

    if let Value::Tensor(Collated::Plain(dense)) = value {
        return Ok(dense);
    }

    match depth(&value) {
        0 => Ok(Dense::Vector(vector(vec![int_of(value, NODE)?], device))),
        1 => Ok(Dense::Vector(vector(int_row(value, NODE)?, device))),
        2 => Ok(Dense::Matrix(matrix(int_rows(value, NODE)?, device)?)),
        _ => {
            let blocks = value
                .into_items(NODE)?
                .into_iter()
                .map(|block| int_rows(block, NODE))
                .collect::<Result<Vec<_>>>()?;
            let height = uniform(blocks.iter().map(Vec::len))?;
            let rows: Vec<Vec<i64>> = blocks.into_iter().flatten().collect();
            let width = uniform_width(&rows)?;
            let depth = if height == 0 { 0 } else { rows.len() / height };
            let data: Vec<i64> = rows.into_iter().flatten().collect();
            Ok(Dense::Cube(Tensor::from_data(
                TensorData::new(data, [depth, height, width]),
                device,
            )))
        }
    }
}
