use super::{Context, Process};
use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use crate::value::Value;
use burn::prelude::Backend;
use std::sync::Arc;

/// Splits a string into tokens.
#[derive(Clone, new)]
pub struct Tokenize {
    tokenizer: Arc<dyn Tokenizer>,
}

impl<B: Backend> Process<B> for Tokenize {
    fn name(&self) -> &'static str {
        "Tokenize"
    }

    fn extra_repr(&self) -> String {
        self.tokenizer.name().to_string()
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        match value {
            Value::Str(text) => Ok(Value::from(self.tokenizer.tokenize(&text)?)),
            other => Err(Error::unexpected("Tokenize", "a str", other.kind())),
        }
    }
}

/// Turns a token, or every token of a sequence, into its list of characters.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToSubList;

fn characters<B: Backend>(token: &str) -> Value<B> {
    Value::List(token.chars().map(|c| Value::Str(c.to_string())).collect())
}

impl<B: Backend> Process<B> for ToSubList {
    fn name(&self) -> &'static str {
        "ToSubList"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        match value {
            Value::Str(token) => Ok(characters(&token)),
            other => {
                let (shape, tokens) = other
                    .into_container()
                    .map_err(|other| Error::unexpected("ToSubList", "a str or a sequence of str", other.kind()))?;
                tokens
                    .into_iter()
                    .map(|token| match token {
                        Value::Str(token) => Ok(characters(&token)),
                        other => Err(Error::unexpected("ToSubList", "a str", other.kind())),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|items| shape.rebuild(items))
            }
        }
    }
}

/// Replaces a sequence (or string) with its length.
#[derive(Clone, Copy, Debug, Default)]
pub struct GetLength;

impl<B: Backend> Process<B> for GetLength {
    fn name(&self) -> &'static str {
        "GetLength"
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        value
            .len()
            .map(Value::from)
            .ok_or_else(|| Error::unexpected("GetLength", "a sequence", value.kind()))
    }
}

/// Replaces every element of a sequence with `mask_token`.
#[derive(Clone, Copy, Debug, new)]
pub struct GetMask {
    mask_token: i64,
}

impl<B: Backend> Process<B> for GetMask {
    fn name(&self) -> &'static str {
        "GetMask"
    }

    fn extra_repr(&self) -> String {
        format!("mask_token={}", self.mask_token)
    }

    fn apply(&self, value: Value<B>, _ctx: &mut Context<'_>) -> Result<Value<B>> {
        let len = value
            .len()
            .ok_or_else(|| Error::unexpected("GetMask", "a sequence", value.kind()))?;
        Ok(Value::List(vec![Value::Int(self.mask_token); len]))
    }
}
