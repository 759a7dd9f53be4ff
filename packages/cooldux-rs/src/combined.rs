//! Combined handler: several operations folded into one state and one reducer.
//!
//! Each operation owns the slice stored under its name. The combined reducer
//! runs every constituent in the order the names were given, threading the
//! combined snapshot through them. A constituent only touches the state when
//! it recognizes the action, so an unrelated action returns the input `Arc`
//! untouched, even for states that carry slices the handler never created.

use std::collections::HashMap;
use std::sync::Arc;

use crate::action::{Action, Payload};
use crate::error::{CoolduxError, Failure};
use crate::handler::{HandlerOptions, OperationState, PromiseHandler};
use crate::reducer::Reducer;

/// Union of per-operation sub-states, keyed by operation name.
#[derive(Debug, Clone, Default)]
pub struct CombinedState {
    slices: HashMap<String, Arc<OperationState>>,
}

impl CombinedState {
    /// An empty combined state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the slice for `name`.
    pub fn with_slice(mut self, name: impl Into<String>, slice: Arc<OperationState>) -> Self {
        self.slices.insert(name.into(), slice);
        self
    }

    /// The slice for `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<OperationState>> {
        self.slices.get(name)
    }

    /// Last result of `name`, if any.
    ///
    /// This is what cached invocations read: any stored value counts.
    pub fn value(&self, name: &str) -> Option<&Payload> {
        self.get(name)?.value.as_ref()
    }

    /// Returns true if `name` is between Start and End/Error.
    pub fn is_pending(&self, name: &str) -> bool {
        self.get(name).is_some_and(|slice| slice.pending)
    }

    /// Failure recorded for `name`, if any.
    pub fn error(&self, name: &str) -> Option<&Failure> {
        self.get(name)?.error.as_ref()
    }

    /// Names of all slices.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Returns true if there are no slices.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// One [`PromiseHandler`] per name, with a combined initial state and reducer.
///
/// # Example
///
/// ```ignore
/// use cooldux::{CombinedHandler, Reducer};
///
/// let handlers = CombinedHandler::new(["users", "teams"], "admin")?;
/// let state = handlers.reduce(None, &action);
/// if state.is_pending("users") { /* spinner */ }
/// ```
pub struct CombinedHandler {
    handlers: Vec<Arc<PromiseHandler>>,
    initial: Arc<CombinedState>,
}

impl CombinedHandler {
    /// Build one handler per name with the same options.
    ///
    /// # Errors
    ///
    /// Propagates [`PromiseHandler::new`] configuration errors.
    pub fn new<I, N>(names: I, options: impl Into<HandlerOptions>) -> Result<Self, CoolduxError>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let options = options.into();
        let handlers = names
            .into_iter()
            .map(|name| PromiseHandler::new(name, options.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_handlers(handlers))
    }

    /// Combine already built handlers, in order.
    pub fn from_handlers(handlers: Vec<Arc<PromiseHandler>>) -> Self {
        let initial = handlers
            .iter()
            .fold(CombinedState::new(), |state, handler| {
                state.with_slice(handler.name(), Arc::clone(handler.initial_state()))
            });
        Self {
            handlers,
            initial: Arc::new(initial),
        }
    }

    /// Constituent handlers, in application order.
    pub fn handlers(&self) -> &[Arc<PromiseHandler>] {
        &self.handlers
    }

    /// Constituent handler for `name`.
    pub fn handler(&self, name: &str) -> Option<&Arc<PromiseHandler>> {
        self.handlers.iter().find(|handler| handler.name() == name)
    }

    /// The combined initial state. Always the same `Arc`.
    pub fn initial_state(&self) -> &Arc<CombinedState> {
        &self.initial
    }
}

impl Reducer<CombinedState> for CombinedHandler {
    fn reduce(&self, state: Option<Arc<CombinedState>>, action: &Action) -> Arc<CombinedState> {
        let mut current = state.unwrap_or_else(|| Arc::clone(&self.initial));

        for handler in &self.handlers {
            if !handler.recognizes(&action.kind) {
                continue;
            }
            let slice = current.get(handler.name()).cloned();
            let next = handler.reduce(slice.clone(), action);
            if slice.is_some_and(|slice| Arc::ptr_eq(&slice, &next)) {
                continue;
            }
            let mut updated = CombinedState::clone(&current);
            updated.slices.insert(handler.name().to_string(), next);
            current = Arc::new(updated);
        }

        current
    }
}

impl std::fmt::Debug for CombinedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("CombinedHandler")
            .field("operations", &names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::OperationStatus;

    #[test]
    fn test_combined_exposes_every_handler() {
        let handlers = CombinedHandler::new(["testA", "testB"], HandlerOptions::default()).unwrap();

        let a = handlers.handler("testA").unwrap();
        let b = handlers.handler("testB").unwrap();
        assert_eq!(a.start().kind(), &"testA_Start");
        assert_eq!(b.error().kind(), &"testB_Error");
        assert!(handlers.handler("testC").is_none());

        let initial = handlers.initial_state();
        assert_eq!(initial.len(), 2);
        assert!(Arc::ptr_eq(initial.get("testA").unwrap(), a.initial_state()));
    }

    #[test]
    fn test_unrelated_action_returns_initial_instance() {
        let handlers = CombinedHandler::new(["testA", "testB"], HandlerOptions::default()).unwrap();
        let state = handlers.reduce(None, &Action::empty("none"));
        assert!(Arc::ptr_eq(&state, handlers.initial_state()));
    }

    #[test]
    fn test_unrelated_action_keeps_foreign_state() {
        let handlers = CombinedHandler::new(["testA", "testB"], HandlerOptions::default()).unwrap();
        let foreign = Arc::new(CombinedState::new().with_slice("foo", Arc::default()));

        let state = handlers.reduce(Some(Arc::clone(&foreign)), &Action::empty("none"));
        assert!(Arc::ptr_eq(&state, &foreign));
    }

    #[test]
    fn test_only_target_slice_changes() {
        let handlers = CombinedHandler::new(["testA", "testB"], "ns").unwrap();
        let a = Arc::clone(handlers.handler("testA").unwrap());

        let state = handlers.reduce(None, &a.start().create_empty());
        assert!(state.is_pending("testA"));
        assert!(!state.is_pending("testB"));
        assert!(Arc::ptr_eq(
            state.get("testB").unwrap(),
            handlers.initial_state().get("testB").unwrap()
        ));
        assert!(!Arc::ptr_eq(&state, handlers.initial_state()));
    }

    #[test]
    fn test_combined_matches_independent_reducers() {
        let handlers = CombinedHandler::new(["testA", "testB"], HandlerOptions::default()).unwrap();
        let a = Arc::clone(handlers.handler("testA").unwrap());
        let b = Arc::clone(handlers.handler("testB").unwrap());

        let actions = vec![
            a.start().create_empty(),
            b.start().create_empty(),
            a.end().create(1u8),
            b.error_action(&Failure::msg("bad")),
        ];

        let combined = actions
            .iter()
            .fold(None, |state, action| Some(handlers.reduce(state, action)))
            .unwrap();

        let only_a = actions
            .iter()
            .fold(None, |state, action| Some(a.reduce(state, action)))
            .unwrap();
        let only_b = actions
            .iter()
            .fold(None, |state, action| Some(b.reduce(state, action)))
            .unwrap();

        assert_eq!(combined.get("testA").unwrap().status(), only_a.status());
        assert_eq!(combined.get("testB").unwrap().status(), only_b.status());
        assert_eq!(combined.value("testA").and_then(|v| v.downcast_ref::<u8>()), Some(&1));
        assert_eq!(only_b.status(), OperationStatus::Failed);
        assert_eq!(combined.error("testB").unwrap().to_string(), "bad");
    }

    #[test]
    fn test_cache_without_namespace_propagates() {
        let err = CombinedHandler::new(["testA"], HandlerOptions::default().with_cache(true));
        assert!(matches!(err, Err(CoolduxError::CacheRequiresNamespace { .. })));
    }
}
