use crate::{error::ContextError, input::Input, sequence::IncrementalSequence};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::Debug;

/// Memoized evaluation of the [`Eval`] DAG with precise invalidation.
pub mod context;

pub use context::IncrementalContext;

/// A stable identity for an [`Eval`] node, used as the memoization key. Built from a stable
/// hash of the eval's structural identity.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct EvalKey(pub SmolStr);

impl EvalKey {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    /// Derives a structural key from any `Debug` representation - used by [`InputRef`] to key
    /// itself after the `Input` it reads, so two `InputRef`s over the same `Input` always
    /// collide to the same memo entry.
    pub fn from_debug<T: Debug>(value: &T) -> Self {
        Self(SmolStr::new(format!("{value:?}")))
    }
}

/// A pure node in the incremental evaluation DAG.
///
/// Given identical input bindings, [`Eval::evaluate`] always produces an identical value -
/// the determinism the whole simulation core relies on for reproducible replay.
/// `Eval` is a plain trait, never an object - the [`IncrementalContext`] is generic over the
/// concrete `Eval` at each call site, so no vtable or `dyn Eval` is required; only the cached
/// *value* is type-erased (see `context.rs`).
pub trait Eval {
    type Output: Clone + Send + Sync + 'static;

    /// This eval's structural identity, used to key the memo and the reverse-dependency
    /// index.
    fn key(&self) -> EvalKey;

    /// Compute this eval's value, reading inputs and sub-evals through `ctx`. `ctx` records
    /// every `Input` this call (transitively) touches so the context can invalidate precisely.
    fn evaluate(&self, ctx: &mut IncrementalContext) -> Result<Self::Output, ContextError>;
}

/// An [`Eval`] that reads the value currently bound to an [`Input`].
#[derive(Debug, Clone)]
pub struct InputRef<T> {
    input: Input,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> InputRef<T> {
    pub fn new(input: Input) -> Self {
        Self {
            input,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Eval for InputRef<T> {
    type Output = T;

    fn key(&self) -> EvalKey {
        EvalKey::from_debug(&self.input)
    }

    fn evaluate(&self, ctx: &mut IncrementalContext) -> Result<T, ContextError> {
        ctx.read_input(&self.input)
    }
}

/// An [`Eval`] that folds an [`IncrementalSequence`] with a reusable accumulator, resuming
/// from the last observed tail rather than refolding from scratch.
pub struct Fold<T, Item, Acc, F> {
    key: EvalKey,
    input: Input,
    seed: Acc,
    extract: fn(&T) -> &IncrementalSequence<Item>,
    step: F,
    _marker: std::marker::PhantomData<fn() -> (T, Item)>,
}

impl<T, Item, Acc, F> Fold<T, Item, Acc, F>
where
    F: Fn(Acc, &Item) -> Acc,
{
    pub fn new(
        key: EvalKey,
        input: Input,
        seed: Acc,
        extract: fn(&T) -> &IncrementalSequence<Item>,
        step: F,
    ) -> Self {
        Self {
            key,
            input,
            seed,
            extract,
            step,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, Item, Acc, F> Eval for Fold<T, Item, Acc, F>
where
    T: Clone + Send + Sync + 'static,
    Item: Clone + Send + Sync + 'static,
    Acc: Clone + Send + Sync + 'static,
    F: Fn(Acc, &Item) -> Acc,
{
    type Output = Acc;

    fn key(&self) -> EvalKey {
        self.key.clone()
    }

    fn evaluate(&self, ctx: &mut IncrementalContext) -> Result<Acc, ContextError> {
        let bound: T = ctx.read_input(&self.input)?;
        let sequence = (self.extract)(&bound);
        let current_len = sequence.tail_marker();

        let (from, acc) = match ctx.fold_state::<Acc>(&self.key) {
            Some((tail, acc)) if tail <= current_len => (tail, acc),
            _ => (0, self.seed.clone()),
        };

        let mut acc = acc;
        for item in sequence.items_since(from) {
            acc = (self.step)(acc, &item);
        }

        ctx.set_fold_state(self.key.clone(), current_len, acc.clone());
        Ok(acc)
    }
}
