use crate::collate::Collated;
use crate::error::{Error, Result};
use crate::vocab::{Counter, Vocab};
use burn::prelude::Backend;

/// A value flowing through a process chain.
///
/// Containers come in two shapes only, [`Shape::List`] and [`Shape::Tuple`], and the
/// combinators rebuild them by shape rather than by inspecting runtime types.
#[derive(Debug, Clone)]
pub enum Value<B: Backend> {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value<B>>),
    Tuple(Vec<Value<B>>),
    Counter(Counter),
    Vocab(Box<Vocab>),
    Tensor(Collated<B>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    List,
    Tuple,
}

impl Shape {
    pub fn rebuild<B: Backend>(self, items: Vec<Value<B>>) -> Value<B> {
        match self {
            Shape::List => Value::List(items),
            Shape::Tuple => Value::Tuple(items),
        }
    }
}

impl<B: Backend> Value<B> {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Counter(_) => "counter",
            Value::Vocab(_) => "vocab",
            Value::Tensor(_) => "tensor",
        }
    }

    /// Number of elements of a container, or of characters of a string.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) | Value::Tuple(items) => Some(items.len()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Splits a container into its shape and children, handing anything else back.
    pub fn into_container(self) -> Result<(Shape, Vec<Value<B>>), Self> {
        match self {
            Value::List(items) => Ok((Shape::List, items)),
            Value::Tuple(items) => Ok((Shape::Tuple, items)),
            other => Err(other),
        }
    }

    /// Children of a container, or an error naming the node that needed them.
    pub fn into_items(self, node: &'static str) -> Result<Vec<Value<B>>> {
        self.into_container()
            .map(|(_, items)| items)
            .map_err(|other| Error::unexpected(node, "a list or tuple", other.kind()))
    }
}

impl<B: Backend> PartialEq for Value<B> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Counter(a), Value::Counter(b)) => a == b,
            (Value::Vocab(a), Value::Vocab(b)) => a == b,
            (Value::Tensor(a), Value::Tensor(b)) => a == b,
            _ => false,
        }
    }
}

impl<B: Backend> From<&str> for Value<B> {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl<B: Backend> From<String> for Value<B> {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<B: Backend> From<i64> for Value<B> {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl<B: Backend> From<usize> for Value<B> {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl<B: Backend> From<f64> for Value<B> {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<B: Backend> From<bool> for Value<B> {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<B: Backend> From<Counter> for Value<B> {
    fn from(value: Counter) -> Self {
        Value::Counter(value)
    }
}

impl<B: Backend> From<Vocab> for Value<B> {
    fn from(value: Vocab) -> Self {
        Value::Vocab(Box::new(value))
    }
}

impl<B: Backend> From<Collated<B>> for Value<B> {
    fn from(value: Collated<B>) -> Self {
        Value::Tensor(value)
    }
}

impl<B: Backend, T: Into<Value<B>>> From<Vec<T>> for Value<B> {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nested_conversion() {
        let value = Value::<TestBackend>::from(vec![vec!["a", "b"], vec!["c"]]);
        assert_eq!(value.kind(), "list");
        assert_eq!(value.len(), Some(2));

        let (shape, items) = value.into_container().unwrap();
        assert_eq!(shape, Shape::List);
        assert_eq!(items[1], Value::from(vec!["c"]));
    }

    #[test]
    fn test_shape_rebuild_keeps_tuple() {
        let value = Value::<TestBackend>::Tuple(vec![1i64.into(), 2i64.into()]);
        let (shape, items) = value.clone().into_container().unwrap();
        assert_eq!(shape.rebuild(items), value);
    }

    #[test]
    fn test_scalar_is_not_a_container() {
        let value = Value::<TestBackend>::from(7i64);
        assert!(value.clone().into_container().is_err());
        assert!(matches!(
            value.into_items("Test"),
            Err(Error::UnexpectedValue { found: "int", .. })
        ));
    }
}
