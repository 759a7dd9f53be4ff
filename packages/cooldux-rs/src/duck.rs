//! Ducks: a feature's action invokers and combined reducer, built from a map
//! of names to functions.
//!
//! Every name gets a [`PromiseHandler`] (through one [`CombinedHandler`]) and a
//! [`DuckInvoker`]. Invoking produces a tagged [`PendingAction`] for the
//! interception stage to pick up.
//!
//! # Example
//!
//! ```ignore
//! use cooldux::{Duck, DuckAction, HandlerOptions};
//!
//! let duck = Duck::builder()
//!     .action("select", DuckAction::passthrough())
//!     .action("double", DuckAction::sync(|n: &u32| Ok::<_, anyhow::Error>(n * 2)))
//!     .action("users", DuckAction::future(|team: Arc<String>| api.fetch_users(team)))
//!     .options(HandlerOptions::namespaced("admin").with_cache(true))
//!     .build()?;
//!
//! let users = pipeline
//!     .dispatch(duck.invoker("users")?.invoke("core".to_string()))
//!     .settled()
//!     .await?;
//! ```

use std::any::{type_name, Any};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::action::{Action, Payload};
use crate::combined::{CombinedHandler, CombinedState};
use crate::error::{CoolduxError, Failure};
use crate::handler::{CachedInvocation, Computation, HandlerOptions, PromiseHandler};
use crate::middleware::PendingAction;
use crate::reducer::Reducer;

/// Type-erased duck function.
pub type ActionFn = Arc<dyn Fn(&str, Payload) -> Computation + Send + Sync>;

/// What a duck name maps to.
#[derive(Clone)]
pub enum DuckAction {
    /// No transformation: the invocation argument is the result.
    Passthrough,
    /// A function run on every (uncached) invocation.
    Function(ActionFn),
}

impl DuckAction {
    /// The "no transformation" marker.
    pub fn passthrough() -> Self {
        DuckAction::Passthrough
    }

    /// A synchronous function of a typed argument.
    pub fn sync<A, T, E, F>(f: F) -> Self
    where
        A: Any + Send + Sync,
        T: Any + Send + Sync,
        E: Into<anyhow::Error> + 'static,
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        DuckAction::Function(Arc::new(move |operation: &str, arg: Payload| {
            match arg.downcast_ref::<A>() {
                Some(arg) => Computation::from_result(f(arg)),
                None => Computation::failed(mismatch::<A>(operation)),
            }
        }))
    }

    /// An asynchronous function of a typed argument.
    pub fn future<A, T, E, Fut, F>(f: F) -> Self
    where
        A: Any + Send + Sync,
        T: Any + Send + Sync,
        E: Into<anyhow::Error> + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        F: Fn(Arc<A>) -> Fut + Send + Sync + 'static,
    {
        DuckAction::Function(Arc::new(move |operation: &str, arg: Payload| {
            match arg.downcast::<A>() {
                Ok(arg) => Computation::from_future(f(arg)),
                Err(_) => Computation::failed(mismatch::<A>(operation)),
            }
        }))
    }

    /// A function over raw payloads.
    pub fn raw<F>(f: F) -> Self
    where
        F: Fn(Payload) -> Computation + Send + Sync + 'static,
    {
        DuckAction::Function(Arc::new(move |_operation: &str, arg: Payload| f(arg)))
    }

    fn run(&self, operation: &str, arg: Payload) -> Computation {
        match self {
            DuckAction::Passthrough => Computation::ready_shared(arg),
            DuckAction::Function(f) => f(operation, arg),
        }
    }
}

fn mismatch<A>(operation: &str) -> Failure {
    Failure::from(CoolduxError::ArgumentMismatch {
        operation: operation.to_string(),
        expected: type_name::<A>(),
    })
}

impl fmt::Debug for DuckAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuckAction::Passthrough => f.write_str("DuckAction::Passthrough"),
            DuckAction::Function(_) => f.write_str("DuckAction::Function(..)"),
        }
    }
}

/// Callable produced for one duck name.
#[derive(Clone)]
pub struct DuckInvoker {
    handler: Arc<PromiseHandler>,
    action: DuckAction,
    cached: Option<CachedInvocation>,
}

impl DuckInvoker {
    /// The handler behind this invoker.
    pub fn handler(&self) -> &Arc<PromiseHandler> {
        &self.handler
    }

    /// Run the function on `arg` and tag the outcome.
    pub fn invoke(&self, arg: impl Any + Send + Sync) -> PendingAction {
        self.invoke_shared(Arc::new(arg))
    }

    /// [`invoke`](Self::invoke) with an already shared argument.
    pub fn invoke_shared(&self, arg: Payload) -> PendingAction {
        let computation = self.action.run(self.handler.name(), arg);
        self.handler.pending(computation)
    }

    /// Tag a cached invocation. `None` unless caching was requested.
    ///
    /// The function runs inside the interception stage, and only on a miss.
    pub fn invoke_cached(&self, arg: impl Any + Send + Sync) -> Option<PendingAction> {
        self.invoke_cached_shared(Arc::new(arg))
    }

    /// [`invoke_cached`](Self::invoke_cached) with an already shared argument.
    pub fn invoke_cached_shared(&self, arg: Payload) -> Option<PendingAction> {
        let cached = self.cached.as_ref()?;
        let action = self.action.clone();
        let handler = Arc::clone(&self.handler);
        Some(cached.defer(move || action.run(handler.name(), arg)))
    }

    /// Returns true if [`invoke_cached`](Self::invoke_cached) is available.
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }
}

impl fmt::Debug for DuckInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckInvoker")
            .field("operation", &self.handler.name())
            .field("action", &self.action)
            .field("cached", &self.cached.is_some())
            .finish()
    }
}

/// Builder for a [`Duck`].
#[derive(Debug, Default)]
pub struct DuckBuilder {
    entries: Vec<(String, DuckAction)>,
    options: HandlerOptions,
}

impl DuckBuilder {
    /// Add a named action.
    pub fn action(mut self, name: impl Into<String>, action: DuckAction) -> Self {
        self.entries.push((name.into(), action));
        self
    }

    /// Options applied to every action.
    pub fn options(mut self, options: impl Into<HandlerOptions>) -> Self {
        self.options = options.into();
        self
    }

    /// Validate and wire everything together.
    ///
    /// # Errors
    ///
    /// - [`CoolduxError::EmptyActionName`] for an empty name
    /// - [`CoolduxError::DuplicateAction`] for a repeated name
    /// - [`CoolduxError::CacheRequiresNamespace`] for cache without namespace
    pub fn build(self) -> Result<Duck, CoolduxError> {
        validate_names(&self.entries)?;

        let combined = CombinedHandler::new(
            self.entries.iter().map(|(name, _)| name.clone()),
            self.options,
        )?;

        let invokers = combined
            .handlers()
            .iter()
            .zip(self.entries)
            .map(|(handler, (name, action))| {
                let invoker = DuckInvoker {
                    cached: handler.cached(),
                    handler: Arc::clone(handler),
                    action,
                };
                (name, invoker)
            })
            .collect();

        Ok(Duck { combined, invokers })
    }
}

fn validate_names(entries: &[(String, DuckAction)]) -> Result<(), CoolduxError> {
    let mut seen = HashSet::new();
    for (name, _) in entries {
        if name.is_empty() {
            return Err(CoolduxError::EmptyActionName);
        }
        if !seen.insert(name.as_str()) {
            return Err(CoolduxError::DuplicateAction { name: name.clone() });
        }
    }
    Ok(())
}

/// A feature's invokers plus its combined reducer.
pub struct Duck {
    combined: CombinedHandler,
    invokers: Vec<(String, DuckInvoker)>,
}

impl Duck {
    /// Start building a duck.
    pub fn builder() -> DuckBuilder {
        DuckBuilder::default()
    }

    /// The invoker for `name`.
    pub fn invoker(&self, name: &str) -> Result<&DuckInvoker, CoolduxError> {
        self.invokers
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, invoker)| invoker)
            .ok_or_else(|| CoolduxError::UnknownAction {
                name: name.to_string(),
            })
    }

    /// Action names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.invokers.iter().map(|(name, _)| name.as_str())
    }

    /// The underlying combined handler.
    pub fn combined(&self) -> &CombinedHandler {
        &self.combined
    }

    /// The combined initial state.
    pub fn initial_state(&self) -> &Arc<CombinedState> {
        self.combined.initial_state()
    }
}

impl Reducer<CombinedState> for Duck {
    fn reduce(&self, state: Option<Arc<CombinedState>>, action: &Action) -> Arc<CombinedState> {
        self.combined.reduce(state, action)
    }
}

impl fmt::Debug for Duck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duck")
            .field("actions", &self.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Build a duck from `(name, action)` pairs.
pub fn make_duck<I, N>(actions: I, options: impl Into<HandlerOptions>) -> Result<Duck, CoolduxError>
where
    I: IntoIterator<Item = (N, DuckAction)>,
    N: Into<String>,
{
    actions
        .into_iter()
        .fold(Duck::builder().options(options), |builder, (name, action)| {
            builder.action(name, action)
        })
        .build()
}
