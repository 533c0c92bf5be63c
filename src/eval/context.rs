use super::{Eval, EvalKey};
use crate::{error::ContextError, input::Input};
use fnv::FnvHashMap;
use std::{
    any::Any,
    collections::HashSet,
    sync::Arc,
};

struct MemoEntry {
    value: Arc<dyn Any + Send + Sync>,
    /// Flattened transitive set of `Input`s this value depends on. Because a parent eval's
    /// frame absorbs every child eval's dependency set as it returns, this is always the full
    /// closure down to raw inputs - never just the inputs read directly by this eval.
    deps: HashSet<Input>,
}

/// Holds current input bindings and the memoized evaluation DAG, invalidating exactly the
/// evals whose recorded dependency set contains a changed input.
///
/// The context is logically a value - each `update_input` conceptually produces the context
/// for the next tick - but is implemented with interior mutation since a single-threaded
/// simulation never needs more than one live reference at a time.
pub struct IncrementalContext {
    inputs: FnvHashMap<Input, Arc<dyn Any + Send + Sync>>,
    memo: FnvHashMap<EvalKey, MemoEntry>,
    reverse_deps: FnvHashMap<Input, HashSet<EvalKey>>,
    fold_state: FnvHashMap<EvalKey, (usize, Arc<dyn Any + Send + Sync>)>,
    /// Stack of in-flight dependency frames, one per nested `evaluate` call. The top frame
    /// collects every `Input` the current call (transitively) reads.
    dep_stack: Vec<HashSet<Input>>,
}

impl Default for IncrementalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalContext {
    pub fn new() -> Self {
        Self {
            inputs: FnvHashMap::default(),
            memo: FnvHashMap::default(),
            reverse_deps: FnvHashMap::default(),
            fold_state: FnvHashMap::default(),
            dep_stack: Vec::new(),
        }
    }

    /// Binds `input` to `value`, evicting every memoized eval whose dependency set contains
    /// `input`. A fold eval's own persisted tail/accumulator survives this eviction - it is
    /// kept in a separate cache the fold eval resumes from on its next `evaluate` call.
    pub fn update_input<T: Send + Sync + 'static>(&mut self, input: Input, value: T) {
        self.inputs.insert(input.clone(), Arc::new(value));

        let Some(affected) = self.reverse_deps.remove(&input) else {
            return;
        };
        for key in affected {
            if let Some(entry) = self.memo.remove(&key) {
                for dep in entry.deps {
                    if dep != input {
                        if let Some(set) = self.reverse_deps.get_mut(&dep) {
                            set.remove(&key);
                        }
                    }
                }
            }
        }
    }

    pub fn is_bound(&self, input: &Input) -> bool {
        self.inputs.contains_key(input)
    }

    /// Reads the value bound to `input`, recording it as a dependency of whichever `evaluate`
    /// call is currently in progress.
    ///
    /// # Panics
    /// Panics if `input` is bound but to a value of a different type than `T` - this
    /// indicates a caller bug (reusing an `Input` variant with inconsistent value types), not
    /// a recoverable runtime condition.
    pub fn read_input<T: Clone + Send + Sync + 'static>(
        &mut self,
        input: &Input,
    ) -> Result<T, ContextError> {
        let bound = self
            .inputs
            .get(input)
            .ok_or_else(|| ContextError::InputNotBound(input.clone()))?;
        let value = bound
            .downcast_ref::<T>()
            .expect("Input bound to a value of an unexpected type")
            .clone();

        if let Some(frame) = self.dep_stack.last_mut() {
            frame.insert(input.clone());
        }

        Ok(value)
    }

    /// Evaluates `eval`, returning the memoized value if its dependencies haven't changed
    /// since it was last computed, and recomputing (and re-memoizing) it otherwise.
    pub fn evaluate<E: Eval>(&mut self, eval: &E) -> Result<E::Output, ContextError> {
        let key = eval.key();

        if let Some(entry) = self.memo.get(&key) {
            let value = entry
                .value
                .downcast_ref::<E::Output>()
                .expect("Eval key reused with a different Output type")
                .clone();
            if let Some(frame) = self.dep_stack.last_mut() {
                frame.extend(entry.deps.iter().cloned());
            }
            return Ok(value);
        }

        self.dep_stack.push(HashSet::new());
        let result = eval.evaluate(self);
        let deps = self
            .dep_stack
            .pop()
            .expect("evaluate pushed a frame immediately above");

        let value = result?;

        if let Some(frame) = self.dep_stack.last_mut() {
            frame.extend(deps.iter().cloned());
        }
        for dep in &deps {
            self.reverse_deps
                .entry(dep.clone())
                .or_default()
                .insert(key.clone());
        }
        self.memo.insert(
            key,
            MemoEntry {
                value: Arc::new(value.clone()),
                deps,
            },
        );

        Ok(value)
    }

    /// Used by [`super::Fold`] to resume from its last observed sequence tail. Not part of the
    /// generic memo - never evicted by `update_input`.
    pub(super) fn fold_state<Acc: Clone + Send + Sync + 'static>(
        &self,
        key: &EvalKey,
    ) -> Option<(usize, Acc)> {
        let (tail, value) = self.fold_state.get(key)?;
        let acc = value
            .downcast_ref::<Acc>()
            .expect("fold key reused with a different accumulator type")
            .clone();
        Some((*tail, acc))
    }

    pub(super) fn set_fold_state<Acc: Send + Sync + 'static>(
        &mut self,
        key: EvalKey,
        tail: usize,
        acc: Acc,
    ) {
        self.fold_state.insert(key, (tail, Arc::new(acc)));
    }
}
