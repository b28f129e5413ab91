use super::Pipe;
use crate::error::{Error, Result};
use crate::value::Value;
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use std::sync::Arc;

/// Collates single-column items with the batch stage of one pipe.
#[derive(Clone, new)]
pub struct PipeBatcher<B: Backend> {
    pipe: Arc<Pipe<B>>,
}

impl<B: Backend> Batcher<Value<B>, Result<Value<B>>> for PipeBatcher<B> {
    fn batch(&self, items: Vec<Value<B>>) -> Result<Value<B>> {
        self.pipe.collate(items)
    }
}

/// Collates table rows column by column, one pipe per column.
#[derive(Clone, new)]
pub struct RowBatcher<B: Backend> {
    pipes: Vec<Arc<Pipe<B>>>,
}

impl<B: Backend> Batcher<Vec<Value<B>>, Result<Vec<Value<B>>>> for RowBatcher<B> {
    fn batch(&self, items: Vec<Vec<Value<B>>>) -> Result<Vec<Value<B>>> {
        let mut columns: Vec<Vec<Value<B>>> = self
            .pipes
            .iter()
            .map(|_| Vec::with_capacity(items.len()))
            .collect();

        for row in items {
            if row.len() != columns.len() {
                return Err(Error::Ragged {
                    expected: columns.len(),
                    found: row.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }

        self.pipes
            .iter()
            .zip(columns)
            .map(|(pipe, column)| pipe.collate(column))
            .collect()
    }
}
