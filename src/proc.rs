pub mod batch;
pub mod text;
pub mod vocab;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::vocab::{Counter, Vocab};
use burn::prelude::Backend;
use std::fmt;
use std::ops::Add;
use std::sync::Arc;

/// Everything a process node may read besides its input.
///
/// The pre stage hands nodes the counter it accumulates into; the post and batch
/// stages hand them the pipe's vocabulary, if one was built.
#[derive(Default)]
pub struct Context<'a> {
    counter: Option<&'a mut Counter>,
    vocab: Option<&'a Vocab>,
    name: Option<&'a str>,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counter(counter: &'a mut Counter) -> Self {
        Self {
            counter: Some(counter),
            ..Self::default()
        }
    }

    pub fn with_vocab(vocab: Option<&'a Vocab>) -> Self {
        Self {
            vocab,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn counter(&mut self) -> Result<&mut Counter> {
        self.counter.as_deref_mut().ok_or(Error::MissingCounter)
    }

    pub fn vocab(&self) -> Result<&'a Vocab> {
        self.vocab.ok_or(Error::VocabNotBuilt)
    }

    pub fn name(&self) -> &str {
        self.name.unwrap_or("")
    }
}

/// A single transform. Implementations must not keep state between calls.
pub trait Process<B: Backend>: Send + Sync {
    fn name(&self) -> &'static str;

    fn extra_repr(&self) -> String {
        String::new()
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>>;
}

pub type LeafFn<B> = dyn Fn(&Value<B>) -> bool + Send + Sync;
pub type StepFn<B> = dyn Fn(Value<B>, Value<B>) -> Result<(Value<B>, Value<B>)> + Send + Sync;

/// Descends into containers until `is_leaf` holds, then applies `leaf`.
#[derive(Clone)]
pub struct Recur<B: Backend> {
    is_leaf: Arc<LeafFn<B>>,
    leaf: Box<Proc<B>>,
}

impl<B: Backend> Recur<B> {
    pub fn new<F>(is_leaf: F, leaf: Proc<B>) -> Self
    where
        F: Fn(&Value<B>) -> bool + Send + Sync + 'static,
    {
        Self {
            is_leaf: Arc::new(is_leaf),
            leaf: Box::new(leaf),
        }
    }

    /// Recursion whose leaves are strings.
    pub fn strings(leaf: Proc<B>) -> Self {
        Self::new(|value| matches!(value, Value::Str(_)), leaf)
    }

    /// Recursion whose leaves are integers.
    pub fn ints(leaf: Proc<B>) -> Self {
        Self::new(|value| matches!(value, Value::Int(_)), leaf)
    }

    fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        if (self.is_leaf)(&value) {
            return self.leaf.apply(value, ctx);
        }
        match value.into_container() {
            Ok((shape, items)) => items
                .into_iter()
                .map(|item| self.apply(item, ctx))
                .collect::<Result<Vec<_>>>()
                .map(|items| shape.rebuild(items)),
            Err(other) => Err(Error::unexpected("Recur", "a leaf or a container", other.kind())),
        }
    }
}

/// A left fold that emits one output per element.
#[derive(Clone)]
pub struct Scan<B: Backend> {
    name: &'static str,
    step: Arc<StepFn<B>>,
    init: Value<B>,
}

impl<B: Backend> Scan<B> {
    pub fn new<F>(name: &'static str, step: F, init: Value<B>) -> Self
    where
        F: Fn(Value<B>, Value<B>) -> Result<(Value<B>, Value<B>)> + Send + Sync + 'static,
    {
        Self {
            name,
            step: Arc::new(step),
            init,
        }
    }

    /// Shifts every integer sequence by the total length of the sequences before it.
    pub fn cum_index() -> Self {
        Self::new("cum_index", cum_index, Value::Int(0))
    }

    fn apply(&self, value: Value<B>) -> Result<Value<B>> {
        let (shape, items) = value
            .into_container()
            .map_err(|other| Error::unexpected("Scan", "a list or tuple", other.kind()))?;

        let mut acc = self.init.clone();
        let mut outputs = Vec::with_capacity(items.len());
        for item in items {
            let (output, next) = (self.step)(item, acc)?;
            outputs.push(output);
            acc = next;
        }
        Ok(shape.rebuild(outputs))
    }
}

fn cum_index<B: Backend>(item: Value<B>, offset: Value<B>) -> Result<(Value<B>, Value<B>)> {
    let offset = offset
        .as_int()
        .ok_or_else(|| Error::unexpected("Scan", "an int offset", offset.kind()))?;
    let (shape, indices) = item
        .into_container()
        .map_err(|other| Error::unexpected("Scan", "a sequence of ints", other.kind()))?;

    let len = indices.len() as i64;
    let shifted = indices
        .into_iter()
        .map(|index| match index {
            Value::Int(i) => Ok(Value::Int(i + offset)),
            other => Err(Error::unexpected("Scan", "an int", other.kind())),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((shape.rebuild(shifted), Value::Int(offset + len)))
}

/// A composable transform.
///
/// A `Chain` built through [`Proc::chain`] or [`Proc::from_list`] is always flat,
/// holds at least two processes, and never contains `Identity`.
#[derive(Clone)]
pub enum Proc<B: Backend> {
    Identity,
    Chain(Vec<Proc<B>>),
    Lift(Box<Proc<B>>),
    Recur(Recur<B>),
    Scan(Scan<B>),
    Node(Arc<dyn Process<B>>),
}

impl<B: Backend> Proc<B> {
    pub fn node<P: Process<B> + 'static>(process: P) -> Self {
        Proc::Node(Arc::new(process))
    }

    pub fn lift(proc: Proc<B>) -> Self {
        Proc::Lift(Box::new(proc))
    }

    /// Zero processes make the identity, one is returned as is, more make a chain.
    pub fn from_list(mut procs: Vec<Proc<B>>) -> Self {
        match procs.len() {
            0 => Proc::Identity,
            1 => procs.remove(0),
            _ => Proc::Chain(procs),
        }
    }

    /// Composes processes left to right, flattening nested chains.
    pub fn chain<I: IntoIterator<Item = Proc<B>>>(procs: I) -> Self {
        Self::from_list(procs.into_iter().flat_map(Proc::into_flat).collect())
    }

    pub fn then(self, next: Proc<B>) -> Self {
        Self::chain([self, next])
    }

    fn into_flat(self) -> Vec<Proc<B>> {
        match self {
            Proc::Identity => Vec::new(),
            Proc::Chain(procs) => procs,
            other => vec![other],
        }
    }

    /// The processes this one runs in order.
    pub fn procs(&self) -> &[Proc<B>] {
        match self {
            Proc::Identity => &[],
            Proc::Chain(procs) => procs,
            other => std::slice::from_ref(other),
        }
    }

    pub fn apply(&self, value: Value<B>, ctx: &mut Context<'_>) -> Result<Value<B>> {
        match self {
            Proc::Identity => Ok(value),
            Proc::Chain(procs) => procs.iter().try_fold(value, |value, proc| proc.apply(value, ctx)),
            Proc::Lift(proc) => {
                let (shape, items) = value
                    .into_container()
                    .map_err(|other| Error::unexpected("Lift", "a list or tuple", other.kind()))?;
                items
                    .into_iter()
                    .map(|item| proc.apply(item, ctx))
                    .collect::<Result<Vec<_>>>()
                    .map(|items| shape.rebuild(items))
            }
            Proc::Recur(recur) => recur.apply(value, ctx),
            Proc::Scan(scan) => scan.apply(value),
            Proc::Node(node) => node.apply(value, ctx),
        }
    }
}

impl<B: Backend> Add for Proc<B> {
    type Output = Proc<B>;

    fn add(self, rhs: Proc<B>) -> Proc<B> {
        self.then(rhs)
    }
}

impl<B: Backend> fmt::Display for Proc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proc::Identity => write!(f, "None"),
            Proc::Chain(procs) => {
                for (index, proc) in procs.iter().enumerate() {
                    if index > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", proc)?;
                }
                Ok(())
            }
            Proc::Lift(proc) => write!(f, "[{}]", proc),
            Proc::Recur(recur) => write!(f, "{}", recur.leaf),
            Proc::Scan(scan) => write!(f, "Scan(fn={})", scan.name),
            Proc::Node(node) => write!(f, "{}({})", node.name(), node.extra_repr()),
        }
    }
}

impl<B: Backend> fmt::Debug for Proc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One element of a stage specification.
#[derive(Clone, Debug)]
pub enum Entry<B: Backend> {
    Proc(Proc<B>),
    /// Stands for the chain currently bound to the stage being overridden.
    Inherit,
}

/// An ordered, possibly nested description of a stage.
#[derive(Clone, Debug)]
pub struct Spec<B: Backend> {
    entries: Vec<Entry<B>>,
}

impl<B: Backend> Default for Spec<B> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<B: Backend> Spec<B> {
    /// The empty specification; it contributes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn inherit() -> Self {
        Self {
            entries: vec![Entry::Inherit],
        }
    }

    pub fn then<S: Into<Spec<B>>>(mut self, next: S) -> Self {
        self.entries.extend(next.into().entries);
        self
    }

    /// Flattens the specification into a sequence with no chains and no identities.
    pub fn compress(self, allow_inherit: bool) -> Result<Vec<Entry<B>>> {
        let mut flat = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            match entry {
                Entry::Inherit if !allow_inherit => return Err(Error::MarkerNotAllowed),
                Entry::Inherit => flat.push(Entry::Inherit),
                Entry::Proc(proc) => flat.extend(proc.into_flat().into_iter().map(Entry::Proc)),
            }
        }
        Ok(flat)
    }

    /// Builds the stage process; inheritance markers are rejected.
    pub fn build(self) -> Result<Proc<B>> {
        let procs = self
            .compress(false)?
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Proc(proc) => Some(proc),
                Entry::Inherit => None,
            })
            .collect();
        Ok(Proc::from_list(procs))
    }

    /// Builds the stage process with every marker replaced by the whole of `current`.
    pub fn splice(self, current: &Proc<B>) -> Proc<B> {
        let entries = self.entries.into_iter().map(|entry| match entry {
            Entry::Proc(proc) => proc,
            Entry::Inherit => current.clone(),
        });
        Proc::chain(entries)
    }
}

impl<B: Backend> From<Proc<B>> for Spec<B> {
    fn from(proc: Proc<B>) -> Self {
        Self {
            entries: vec![Entry::Proc(proc)],
        }
    }
}

impl<B: Backend> From<Option<Proc<B>>> for Spec<B> {
    fn from(proc: Option<Proc<B>>) -> Self {
        proc.map(Spec::from).unwrap_or_default()
    }
}

impl<B: Backend, S: Into<Spec<B>>> From<Vec<S>> for Spec<B> {
    fn from(specs: Vec<S>) -> Self {
        specs.into_iter().fold(Spec::none(), Spec::then)
    }
}
