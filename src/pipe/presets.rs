//! Ready-made pipes for the usual column kinds.
//!
//! Token pipes are the raw tensor pipes with a vocabulary spliced in front of their
//! post stage, so overriding any stage of a preset works the same way.

use super::Pipe;
use crate::collate::Dense;
use crate::error::{Error, Result};
use crate::proc::batch::{PackSeq, PackSub, PadSeq, PadSub, PadToken, ToDevice, ToMask, ToTensor};
use crate::proc::text::{GetLength, GetMask, ToSubList};
use crate::proc::vocab::{numbering, rev_vocab, BuildVocab, StatsVocab, UpdateCounter};
use crate::proc::{Proc, Spec};
use crate::vocab::VocabConfig;
use burn::prelude::Backend;

fn vocab_stage<B: Backend>(config: VocabConfig) -> Proc<B> {
    Proc::node(BuildVocab::new(config)) + Proc::node(StatsVocab)
}

fn numbered<B: Backend>() -> Spec<B> {
    Spec::from(numbering()).then(Spec::inherit())
}

impl<B: Backend> Pipe<B> {
    /// Keeps raw strings; batches are plain lists.
    pub fn raw_str() -> Self {
        Self::identity()
    }

    /// Integer sequences padded into a `[batch, len]` tensor.
    pub fn padded_raw_tensor(device: &B::Device, pad: impl Into<PadToken>, batch_first: bool) -> Self {
        Self::identity()
            .with_post(Proc::node(ToTensor::new(device.clone())))
            .with_batch(
                Proc::node(PadSeq::new(pad, batch_first, device.clone()))
                    + Proc::node(ToDevice::new(device.clone())),
            )
    }

    /// Integer sequences packed without padding.
    pub fn packed_raw_tensor(device: &B::Device) -> Self {
        Self::identity()
            .with_post(Proc::node(ToTensor::new(device.clone())))
            .with_batch(Proc::node(PackSeq::new(device.clone())) + Proc::node(ToDevice::new(device.clone())))
    }

    /// Token sequences numbered through a vocabulary and padded with `pad_token`.
    pub fn padded_seq(device: &B::Device, unk_token: Option<&str>, pad_token: &str, batch_first: bool) -> Self {
        let config = VocabConfig::default()
            .with_unk_token(unk_token)
            .with_pad_token(Some(pad_token));

        Self::padded_raw_tensor(device, pad_token, batch_first)
            .with_pre(Proc::node(UpdateCounter))
            .with_vocab(vocab_stage(config))
            .with_post(numbered())
    }

    /// Token sequences numbered through a vocabulary and packed.
    pub fn packed_seq(device: &B::Device, unk_token: Option<&str>) -> Self {
        let config = VocabConfig::default().with_unk_token(unk_token);

        Self::packed_raw_tensor(device)
            .with_pre(Proc::node(UpdateCounter))
            .with_vocab(vocab_stage(config))
            .with_post(numbered())
    }

    /// A boolean mask over each sequence, `true` on tokens when `filling_mask` is
    /// set and on padding otherwise.
    pub fn padded_seq_mask(device: &B::Device, filling_mask: bool, batch_first: bool) -> Self {
        let (token, pad) = if filling_mask { (1, 0i64) } else { (0, 1i64) };

        Self::identity()
            .with_post(Proc::node(GetMask::new(token)))
            .with_batch(
                Proc::node(PadSeq::new(pad, batch_first, device.clone()))
                    + Proc::node(ToMask)
                    + Proc::node(ToDevice::new(device.clone())),
            )
    }

    /// The length of each sequence, batched into a vector.
    pub fn seq_length(device: &B::Device) -> Self {
        Self::identity()
            .with_post(Proc::node(GetLength))
            .with_batch(Proc::node(ToTensor::new(device.clone())) + Proc::node(ToDevice::new(device.clone())))
    }

    /// Numbers tokens, then maps them back, so unknown tokens come out as the
    /// unknown token.
    pub fn rev_seq(unk_token: Option<&str>) -> Self {
        let config = VocabConfig::default().with_unk_token(unk_token);

        Self::identity()
            .with_pre(Proc::node(UpdateCounter))
            .with_vocab(vocab_stage(config))
            .with_post(numbering() + rev_vocab())
    }

    /// Sequences of integer sub-sequences padded into a `[batch, len, sub_len]` tensor.
    pub fn padded_raw_sub(device: &B::Device, pad: impl Into<PadToken>, batch_first: bool) -> Self {
        Self::identity()
            .with_post(Proc::lift(Proc::node(ToTensor::new(device.clone()))))
            .with_batch(
                Proc::node(PadSub::new(pad, batch_first, device.clone()))
                    + Proc::node(ToDevice::new(device.clone())),
            )
    }

    /// Sequences of integer sub-sequences, concatenated per instance and packed.
    pub fn packed_raw_sub(device: &B::Device) -> Self {
        Self::identity()
            .with_post(Proc::lift(Proc::node(ToTensor::new(device.clone()))))
            .with_batch(Proc::node(PackSub::new(device.clone())) + Proc::node(ToDevice::new(device.clone())))
    }

    /// Token sequences split into characters, numbered through a character
    /// vocabulary and padded.
    pub fn padded_sub(
        device: &B::Device,
        unk_token: Option<&str>,
        pad_token: &str,
        special_tokens: &[&str],
        batch_first: bool,
    ) -> Self {
        let config = VocabConfig::default()
            .with_unk_token(unk_token)
            .with_pad_token(Some(pad_token))
            .with_special_tokens(special_tokens.iter().map(|token| Some(*token)));

        Self::padded_raw_sub(device, pad_token, batch_first)
            .with_pre(Proc::node(ToSubList) + Proc::lift(Proc::node(UpdateCounter)))
            .with_vocab(vocab_stage(config))
            .with_post(numbered())
    }

    /// Token sequences split into characters, numbered and packed.
    pub fn packed_sub(device: &B::Device, unk_token: Option<&str>, special_tokens: &[&str]) -> Self {
        let config = VocabConfig::default()
            .with_unk_token(unk_token)
            .with_special_tokens(special_tokens.iter().map(|token| Some(*token)));

        Self::packed_raw_sub(device)
            .with_pre(Proc::node(ToSubList) + Proc::lift(Proc::node(UpdateCounter)))
            .with_vocab(vocab_stage(config))
            .with_post(numbered())
    }

    /// Decodes a padded index matrix back to tokens through the bound vocabulary.
    ///
    /// Row `i` keeps its first `token_sizes[i]` tokens; without sizes every row
    /// keeps the full padded width.
    pub fn inv(&self, data: &Dense<B>, batch_first: bool, token_sizes: Option<&[usize]>) -> Result<Vec<Vec<String>>> {
        let vocab = self.vocab().ok_or(Error::VocabNotBuilt)?;
        let Dense::Matrix(tensor) = data else {
            return Err(Error::unexpected("inv", "a matrix", data.kind()));
        };
        let tensor = if batch_first {
            tensor.clone()
        } else {
            tensor.clone().transpose()
        };

        let [height, width] = tensor.dims();
        if let Some(sizes) = token_sizes {
            if sizes.len() != height {
                return Err(Error::Ragged {
                    expected: height,
                    found: sizes.len(),
                });
            }
            if let Some(&found) = sizes.iter().find(|&&size| size > width) {
                return Err(Error::Ragged { expected: width, found });
            }
        }

        let flat: Vec<i64> = tensor.into_data().iter::<i64>().collect();
        (0..height)
            .map(|row| {
                let size = token_sizes.map_or(width, |sizes| sizes[row]);
                flat[row * width..row * width + size]
                    .iter()
                    .map(|&index| {
                        let index = usize::try_from(index).map_err(|_| Error::NegativeIndex(index))?;
                        vocab.token(index).map(str::to_string)
                    })
                    .collect()
            })
            .collect()
    }
}
