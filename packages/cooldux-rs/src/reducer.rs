//! Reducer trait and the reset wrapper.
//!
//! Reducers are pure: `(state, action) -> state`. States are shared `Arc`
//! snapshots, so "nothing changed" is expressed by returning the input `Arc`
//! and callers can detect it with `Arc::ptr_eq`.
//!
//! # Key Properties
//!
//! - **No in-place mutation**: a transition builds a new snapshot
//! - **Missing state**: `None` means "use your own initial state"
//! - **Reset**: [`reset_reducer`] short-circuits the [`reset`] action back to
//!   the exact initial snapshot it was given

use std::sync::Arc;

use crate::action::{Action, ActionCreator, ActionKind};

/// Discriminator of the global reset action.
pub const RESET_KIND: &str = "cooldux-RESET";

/// Creator for the global reset action.
pub fn reset_creator() -> ActionCreator {
    ActionCreator::new(RESET_KIND)
}

/// Build the global reset action.
pub fn reset() -> Action {
    Action::empty(RESET_KIND)
}

/// A pure state transition function.
///
/// Implemented automatically for any `Fn(Option<Arc<S>>, &Action) -> Arc<S>`.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use cooldux::{Action, Reducer};
///
/// #[derive(Default)]
/// struct Counter { count: i64 }
///
/// let counter = |state: Option<Arc<Counter>>, action: &Action| {
///     let state = state.unwrap_or_default();
///     match action.kind.as_str() {
///         "counter-INC" => Arc::new(Counter { count: state.count + 1 }),
///         _ => state,
///     }
/// };
/// ```
pub trait Reducer<S>: Send + Sync {
    /// Apply `action` to `state`, returning the next snapshot.
    fn reduce(&self, state: Option<Arc<S>>, action: &Action) -> Arc<S>;
}

impl<S, F> Reducer<S> for F
where
    F: Fn(Option<Arc<S>>, &Action) -> Arc<S> + Send + Sync,
{
    fn reduce(&self, state: Option<Arc<S>>, action: &Action) -> Arc<S> {
        self(state, action)
    }
}

/// Reducer wrapper that returns to its initial snapshot on [`reset`].
pub struct ResetReducer<S, R> {
    initial: Arc<S>,
    inner: R,
    reset_kind: ActionKind,
}

impl<S, R> ResetReducer<S, R>
where
    R: Reducer<S>,
{
    /// Wrap `inner` so the reset action yields `initial`.
    pub fn new(initial: Arc<S>, inner: R) -> Self {
        Self {
            initial,
            inner,
            reset_kind: ActionKind::from(RESET_KIND),
        }
    }

    /// The snapshot returned on reset.
    pub fn initial_state(&self) -> &Arc<S> {
        &self.initial
    }
}

impl<S, R> Reducer<S> for ResetReducer<S, R>
where
    S: Send + Sync,
    R: Reducer<S>,
{
    fn reduce(&self, state: Option<Arc<S>>, action: &Action) -> Arc<S> {
        if action.is(&self.reset_kind) {
            return Arc::clone(&self.initial);
        }
        self.inner.reduce(state, action)
    }
}

/// Wrap `reducer` so the global reset action returns `initial`.
pub fn reset_reducer<S, R>(initial: Arc<S>, reducer: R) -> ResetReducer<S, R>
where
    R: Reducer<S>,
{
    ResetReducer::new(initial, reducer)
}
