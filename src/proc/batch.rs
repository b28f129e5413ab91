use super::{Context, Process};
use crate::collate::{self, int_row, int_rows, Collated, Dense, PackedSeq};
use crate::error::{Error, Result};
use crate::value::Value;
use burn::prelude::*;
use std::fmt;

/// The value used for padding: a literal index or a token resolved in the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadToken {
    Index(i64),
    Token(String),
}

impl PadToken {
    fn resolve(&self, ctx: &Context<'_>) -> Result<i64> {
        match self {
            PadToken::Index(index) => Ok(*index),
            PadToken::Token(token) => {
                let vocab = ctx.vocab()?;
                vocab
                    .get(token)
                    .map(|index| index as i64)
                    .ok_or_else(|| Error::UnknownToken(token.clone()))
            }
        }
    }
}

impl fmt::Display for PadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadToken::Index(index) => write!(f, "{}", index),
            PadToken::Token(token) => write!(f, "'{}'", token),
        }
    }
}

impl From<i64> for PadToken {
    fn from(index: i64) -> Self {
        PadToken::Index(index)
    }
}

impl From<&str> for PadToken {
    fn from(token: &str) -> Self {
        PadToken::Token(token.to_string())
    }
}

fn plain<B: Backend>(dense: Dense<B>) -> Value<B> {
    Value::Tensor(Collated::Plain(dense))
}

/// Converts ints or rectangular nested lists of ints into a tensor.
#[derive(Clone, Debug, new)]
pub struct ToTensor<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Process<B> for ToTensor<B> {
    fn name(&self) -> &'static str {
        "ToTensor"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        collate::to_dense(value, &self.device).map(plain)
    }
}

/// Stacks equally long sequences into a `[batch, len]` tensor.
#[derive(Clone, Debug, new)]
pub struct Stack<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Process<B> for Stack<B> {
    fn name(&self) -> &'static str {
        "Stack"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        let rows = value
            .into_items("Stack")?
            .into_iter()
            .map(|row| match row {
                Value::Tensor(Collated::Plain(Dense::Vector(t))) => Ok(t),
                other => int_row(other, "Stack").map(|row| collate::vector(row, &self.device)),
            })
            .collect::<Result<Vec<Tensor<B, 1, Int>>>>()?;

        if rows.is_empty() {
            return Ok(plain(Dense::Matrix(collate::matrix(Vec::new(), &self.device)?)));
        }
        let [expected] = rows[0].dims();
        if let Some(row) = rows.iter().find(|row| row.dims() != [expected]) {
            let [found] = row.dims();
            return Err(Error::Ragged { expected, found });
        }

        let stacked: Tensor<B, 2, Int> = Tensor::stack(rows, 0);
        Ok(plain(Dense::Matrix(stacked.to_device(&self.device))))
    }
}

/// Pads a batch of sequences into a `[batch, len]` tensor (or `[len, batch]`).
#[derive(Clone, Debug)]
pub struct PadSeq<B: Backend> {
    pad: PadToken,
    batch_first: bool,
    device: B::Device,
}

impl<B: Backend> PadSeq<B> {
    pub fn new(pad: impl Into<PadToken>, batch_first: bool, device: B::Device) -> Self {
        Self {
            pad: pad.into(),
            batch_first,
            device,
        }
    }
}

impl<B: Backend> Process<B> for PadSeq<B> {
    fn name(&self) -> &'static str {
        "PadSeq"
    }

    fn extra_repr(&self) -> String {
        format!("pad_token={}, batch_first={}", self.pad, self.batch_first)
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        let pad = self.pad.resolve(ctx)?;
        let rows = value
            .into_items("PadSeq")?
            .into_iter()
            .map(|row| int_row(row, "PadSeq"))
            .collect::<Result<Vec<_>>>()?;

        let padded = collate::pad_rows(rows, pad, &self.device);
        let padded = if self.batch_first {
            padded
        } else {
            padded.swap_dims(0, 1)
        };
        Ok(plain(Dense::Matrix(padded)))
    }
}

/// Pads a batch of sequences of sub-sequences into a `[batch, len, sub_len]` tensor.
#[derive(Clone, Debug)]
pub struct PadSub<B: Backend> {
    pad: PadToken,
    batch_first: bool,
    device: B::Device,
}

impl<B: Backend> PadSub<B> {
    pub fn new(pad: impl Into<PadToken>, batch_first: bool, device: B::Device) -> Self {
        Self {
            pad: pad.into(),
            batch_first,
            device,
        }
    }
}

impl<B: Backend> Process<B> for PadSub<B> {
    fn name(&self) -> &'static str {
        "PadSub"
    }

    fn extra_repr(&self) -> String {
        format!("pad_token={}, batch_first={}", self.pad, self.batch_first)
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        let pad = self.pad.resolve(ctx)?;
        let batch = value
            .into_items("PadSub")?
            .into_iter()
            .map(|instance| int_rows(instance, "PadSub"))
            .collect::<Result<Vec<_>>>()?;

        let padded = collate::pad_cube(batch, pad, &self.device);
        let padded = if self.batch_first {
            padded
        } else {
            padded.swap_dims(0, 1)
        };
        Ok(plain(Dense::Cube(padded)))
    }
}

/// Packs a batch of sequences without padding.
#[derive(Clone, Debug, new)]
pub struct PackSeq<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Process<B> for PackSeq<B> {
    fn name(&self) -> &'static str {
        "PackSeq"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        let rows = value
            .into_items("PackSeq")?
            .into_iter()
            .map(|row| int_row(row, "PackSeq"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Tensor(Collated::Packed(PackedSeq::pack(rows, &self.device))))
    }
}

/// Concatenates the sub-sequences of every instance, then packs the batch.
#[derive(Clone, Debug, new)]
pub struct PackSub<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Process<B> for PackSub<B> {
    fn name(&self) -> &'static str {
        "PackSub"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        let rows = value
            .into_items("PackSub")?
            .into_iter()
            .map(|instance| int_rows(instance, "PackSub").map(|rows| rows.concat()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Tensor(Collated::Packed(PackedSeq::pack(rows, &self.device))))
    }
}

/// Casts an integer matrix to a boolean mask.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToMask;

impl<B: Backend> Process<B> for ToMask {
    fn name(&self) -> &'static str {
        "ToMask"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        match value {
            Value::Tensor(collated) => collated.map_dense(Dense::into_mask).map(Value::Tensor),
            other => Err(Error::unexpected("ToMask", "a tensor", other.kind())),
        }
    }
}

/// Moves tensors, including those inside lists and tuples, to a device.
#[derive(Clone, Debug, new)]
pub struct ToDevice<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ToDevice<B> {
    fn move_value(&self, value: Value<B>) -> Result<Value<B>> {
        match value {
            Value::Tensor(collated) => collated
                .map_dense(|dense| Ok(dense.to_device(&self.device)))
                .map(Value::Tensor),
            other => match other.into_container() {
                Ok((shape, items)) => items
                    .into_iter()
                    .map(|item| self.move_value(item))
                    .collect::<Result<Vec<_>>>()
                    .map(|items| shape.rebuild(items)),
                Err(other) => Ok(other),
            },
        }
    }
}

impl<B: Backend> Process<B> for ToDevice<B> {
    fn name(&self) -> &'static str {
        "ToDevice"
    }

    fn extra_repr(&self) -> String {
        format!("device={:?}", self.device)
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        self.move_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Proc;
    use crate::vocab::{Counter, Vocab, VocabConfig};
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;
    type V = Value<TestBackend>;

    fn dense(value: V) -> Dense<TestBackend> {
        match value {
            Value::Tensor(Collated::Plain(dense)) => dense,
            other => panic!("expected a plain tensor, got {}", other.kind()),
        }
    }

    fn flat(dense: &Dense<TestBackend>) -> Vec<i64> {
        dense.to_data().iter::<i64>().collect()
    }

    fn vocab() -> Vocab {
        let mut counter = Counter::new();
        counter.update(["a", "b"]);
        Vocab::build(counter, VocabConfig::default().with_pad_token(Some("<pad>")))
    }

    #[test]
    fn test_pad_seq_with_index() {
        let device = <TestBackend as Backend>::Device::default();
        let proc = Proc::<TestBackend>::node(PadSeq::new(0i64, true, device));
        let batch = V::from(vec![vec![5i64, 6, 7], vec![8]]);

        let out = dense(proc.apply(batch, &mut Context::new()).unwrap());
        assert_eq!(out.dims(), vec![2, 3]);
        assert_eq!(flat(&out), vec![5, 6, 7, 8, 0, 0]);
    }

    #[test]
    fn test_pad_seq_time_first() {
        let device = <TestBackend as Backend>::Device::default();
        let proc = Proc::<TestBackend>::node(PadSeq::new(0i64, false, device));
        let batch = V::from(vec![vec![1i64, 2], vec![3]]);

        let out = dense(proc.apply(batch, &mut Context::new()).unwrap());
        assert_eq!(out.dims(), vec![2, 2]);
        assert_eq!(flat(&out), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_pad_token_resolves_through_vocab() {
        let device = <TestBackend as Backend>::Device::default();
        let vocab = vocab();
        let proc = Proc::<TestBackend>::node(PadSeq::new("<pad>", true, device));
        let batch = V::from(vec![vec![2i64, 3], vec![2]]);

        let out = dense(proc.apply(batch.clone(), &mut Context::with_vocab(Some(&vocab))).unwrap());
        assert_eq!(flat(&out), vec![2, 3, 2, 1]);

        let missing = proc.apply(batch.clone(), &mut Context::new());
        assert!(matches!(missing, Err(Error::VocabNotBuilt)));

        let device = <TestBackend as Backend>::Device::default();
        let unknown = Proc::<TestBackend>::node(PadSeq::new("<nope>", true, device));
        let result = unknown.apply(batch, &mut Context::with_vocab(Some(&vocab)));
        assert!(matches!(result, Err(Error::UnknownToken(token)) if token == "<nope>"));
    }

    #[test]
    fn test_pad_sub() {
        let device = <TestBackend as Backend>::Device::default();
        let proc = Proc::<TestBackend>::node(PadSub::new(-1i64, true, device));
        let batch = V::from(vec![vec![vec![1i64, 2], vec![3]], vec![vec![4i64]]]);

        let out = dense(proc.apply(batch, &mut Context::new()).unwrap());
        assert_eq!(out.dims(), vec![2, 2, 2]);
        assert_eq!(flat(&out), vec![1, 2, 3, -1, 4, -1, -1, -1]);
    }

    #[test]
    fn test_stack_requires_equal_lengths() {
        let device = <TestBackend as Backend>::Device::default();
        let proc = Proc::<TestBackend>::node(Stack::new(device));

        let out = dense(
            proc.apply(V::from(vec![vec![1i64, 2], vec![3, 4]]), &mut Context::new())
                .unwrap(),
        );
        assert_eq!(out.dims(), vec![2, 2]);

        let ragged = proc.apply(V::from(vec![vec![1i64, 2], vec![3]]), &mut Context::new());
        assert!(matches!(
            ragged,
            Err(Error::Ragged {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_pack_seq_and_sub() {
        let device = <TestBackend as Backend>::Device::default();
        let seq = Proc::<TestBackend>::node(PackSeq::new(device));
        let out = seq
            .apply(V::from(vec![vec![1i64], vec![2, 3]]), &mut Context::new())
            .unwrap();
        let Value::Tensor(Collated::Packed(packed)) = out else {
            panic!("expected a packed tensor");
        };
        assert_eq!(packed.batch_sizes, vec![2, 1]);

        let device = <TestBackend as Backend>::Device::default();
        let sub = Proc::<TestBackend>::node(PackSub::new(device));
        let out = sub
            .apply(
                V::from(vec![vec![vec![1i64, 2], vec![3]], vec![vec![4i64]]]),
                &mut Context::new(),
            )
            .unwrap();
        let Value::Tensor(Collated::Packed(packed)) = out else {
            panic!("expected a packed tensor");
        };
        assert_eq!(packed.batch_sizes, vec![2, 1, 1]);
        let data: Vec<i64> = packed.data.into_data().iter::<i64>().collect();
        assert_eq!(data, vec![1, 4, 2, 3]);
    }

    #[test]
    fn test_to_tensor_then_mask_then_device() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let proc = Proc::<TestBackend>::node(ToTensor::new(device.clone()))
            + Proc::node(ToMask)
            + Proc::node(ToDevice::new(device.clone()));

        let out = dense(
            proc.apply(V::from(vec![vec![1i64, 0], vec![0, 2]]), &mut Context::new())
                .unwrap(),
        );
        let Dense::Mask(mask) = out else {
            panic!("expected a mask, got {}", out.kind());
        };
        let mask: Vec<i64> = mask.int().into_data().iter::<i64>().collect();
        assert_eq!(mask, vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_to_device_walks_tuples() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let tensor = Value::Tensor(Collated::Plain(Dense::Vector(collate::vector(vec![1, 2], &device))));
        let value = V::Tuple(vec![tensor.clone(), V::Int(3)]);

        let out = Proc::node(ToDevice::new(device))
            .apply(value.clone(), &mut Context::new())
            .unwrap();
        assert_eq!(out, value);
    }
}
