use super::{Dataset, Pipe, PipeId, StageKey};
use crate::error::{Error, Result};
use crate::value::Value;
use burn::data::dataset::Dataset as RowDataset;
use burn::prelude::Backend;
use std::collections::HashSet;

struct Column<B: Backend> {
    name: String,
    pipe: PipeId,
    values: Vec<Value<B>>,
}

/// An in-memory dataset of named, equally long columns.
pub struct Table<B: Backend> {
    columns: Vec<Column<B>>,
    done: HashSet<StageKey>,
}

impl<B: Backend> Default for Table<B> {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            done: HashSet::new(),
        }
    }
}

impl<B: Backend> Table<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a column processed by `pipe`.
    pub fn with_column(mut self, name: impl Into<String>, pipe: &Pipe<B>, values: Vec<Value<B>>) -> Self {
        let name = name.into();
        self.columns.retain(|column| column.name != name);
        self.done.retain(|key| key.column != name);
        self.columns.push(Column {
            name,
            pipe: pipe.id(),
            values,
        });
        self
    }

    /// Number of rows, i.e. the length of the shortest column.
    pub fn len(&self) -> usize {
        self.columns
            .iter()
            .map(|column| column.values.len())
            .min()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, name: &str) -> Option<&Column<B>> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// All values of one row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<Value<B>>> {
        if index >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|column| column.values[index].clone()).collect())
    }

    /// Per-instance sizes of a column, as consumed by the samplers.
    ///
    /// Sequences and strings count their elements; tensors their first dimension;
    /// scalars count as one.
    pub fn sizes(&self, name: &str) -> Result<Vec<usize>> {
        let column = self
            .find(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))?;

        Ok(column
            .values
            .iter()
            .map(|value| match value {
                Value::Tensor(collated) => collated
                    .dense()
                    .and_then(|dense| dense.dims().first().copied())
                    .unwrap_or(1),
                other => other.len().unwrap_or(1),
            })
            .collect())
    }
}

impl<B: Backend> Dataset<B> for Table<B> {
    fn columns(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    fn owner(&self, column: &str) -> Option<PipeId> {
        self.find(column).map(|column| column.pipe)
    }

    fn column(&self, column: &str) -> Option<&[Value<B>]> {
        self.find(column).map(|column| column.values.as_slice())
    }

    fn set_column(&mut self, name: &str, values: Vec<Value<B>>) {
        if let Some(column) = self.columns.iter_mut().find(|column| column.name == name) {
            column.values = values;
        }
    }

    fn is_done(&self, key: &StageKey) -> bool {
        self.done.contains(key)
    }

    fn mark_done(&mut self, key: StageKey) {
        self.done.insert(key);
    }
}

impl<B: Backend> RowDataset<Vec<Value<B>>> for Table<B> {
    fn get(&self, index: usize) -> Option<Vec<Value<B>>> {
        self.row(index)
    }

    fn len(&self) -> usize {
        Table::len(self)
    }
}
