//! Async operation handler: Start/End/Error creators, a derived reducer, and
//! the invoker that drives a computation through them.
//!
//! # State Machine
//!
//! ```text
//! Idle / Succeeded / Failed ──Start──► Pending        (error cleared)
//! Pending ──End(value)──► Succeeded                    (pending, error cleared)
//! Pending ──Error(failure)──► Failed                   (value kept, error set)
//! anything ──unrelated──► unchanged (same Arc)
//! ```
//!
//! # Discriminators
//!
//! For operation `users` in namespace `admin` the kinds are
//! `admin-users_Start`, `admin-users_End` and `admin-users_Error`. Without a
//! namespace the prefix is dropped: `users_Start`.
//!
//! # Already-Settled Computations
//!
//! A [`Computation::Ready`] never dispatches Start: it dispatches only End (or
//! only Error). Pending computations dispatch Start as soon as they are
//! handed to [`PromiseHandler::handle`].

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::{Action, ActionCreator, ActionKind, Payload};
use crate::error::{CoolduxError, Failure};
use crate::middleware::{DeferredCall, Dispatch, PendingAction, Settlement};
use crate::reducer::Reducer;

// =============================================================================
// Options
// =============================================================================

/// Options shared by a handler, a combined handler, or a duck.
///
/// Deserializes from either a map or a bare string (namespace shorthand):
///
/// ```ignore
/// let opts: HandlerOptions = serde_json::from_str(r#"{"namespace":"admin","throwErrors":true}"#)?;
/// let same_ns: HandlerOptions = serde_json::from_str(r#""admin""#)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawOptions", rename_all = "camelCase")]
pub struct HandlerOptions {
    /// Prefix for action kinds, and the state slice cached lookups read from.
    pub namespace: Option<String>,
    /// Re-raise failures to the caller instead of resolving to `None`.
    pub throw_errors: bool,
    /// Enable the cached invocation path. Requires a namespace.
    pub cache: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOptions {
    Namespace(String),
    Full(FullOptions),
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FullOptions {
    namespace: Option<String>,
    throw_errors: bool,
    cache: bool,
}

impl From<RawOptions> for HandlerOptions {
    fn from(raw: RawOptions) -> Self {
        match raw {
            RawOptions::Namespace(namespace) => Self::from(namespace),
            RawOptions::Full(full) => Self {
                namespace: full.namespace,
                throw_errors: full.throw_errors,
                cache: full.cache,
            },
        }
    }
}

impl HandlerOptions {
    /// Options with only a namespace set.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self::default().with_namespace(namespace)
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set whether failures are re-raised to the caller.
    pub fn with_throw_errors(mut self, throw_errors: bool) -> Self {
        self.throw_errors = throw_errors;
        self
    }

    /// Set whether the cached invocation path is enabled.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Parse options from JSON (a map or a bare namespace string).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The effective namespace. Empty strings count as no namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

impl From<&str> for HandlerOptions {
    fn from(namespace: &str) -> Self {
        Self::namespaced(namespace)
    }
}

impl From<String> for HandlerOptions {
    fn from(namespace: String) -> Self {
        Self::namespaced(namespace)
    }
}

// =============================================================================
// Sub-state
// =============================================================================

/// Coarse status of an operation, derived from its [`OperationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    /// Never started, or ended with no value.
    Idle,
    /// Started and not yet settled.
    Pending,
    /// Settled with a value.
    Succeeded,
    /// Settled with a failure.
    Failed,
}

/// Per-operation sub-state.
#[derive(Clone, Default)]
pub struct OperationState {
    /// Last successful result.
    pub value: Option<Payload>,
    /// True between Start and End/Error.
    pub pending: bool,
    /// Failure from the most recent Error, cleared by Start and End.
    pub error: Option<Failure>,
}

impl OperationState {
    /// Current status. A recorded failure outranks a retained value.
    pub fn status(&self) -> OperationStatus {
        if self.pending {
            OperationStatus::Pending
        } else if self.error.is_some() {
            OperationStatus::Failed
        } else if self.value.is_some() {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Idle
        }
    }

    /// Downcast the last result.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationState")
            .field("has_value", &self.value.is_some())
            .field("pending", &self.pending)
            .field("error", &self.error)
            .finish()
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Work handed to an invoker: already settled, or still running.
pub enum Computation {
    /// A settled outcome.
    Ready(Result<Payload, Failure>),
    /// A future that settles later.
    Pending(BoxFuture<'static, Result<Payload, Failure>>),
}

impl Computation {
    /// A settled success.
    pub fn ready<T: Any + Send + Sync>(value: T) -> Self {
        Self::Ready(Ok(Arc::new(value)))
    }

    /// A settled success from an already shared payload.
    pub fn ready_shared(value: Payload) -> Self {
        Self::Ready(Ok(value))
    }

    /// A settled failure.
    pub fn failed(failure: impl Into<Failure>) -> Self {
        Self::Ready(Err(failure.into()))
    }

    /// Wrap a fallible future. Its output is boxed into a [`Payload`] and its
    /// error into a [`Failure`].
    pub fn from_future<F, T, E>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Any + Send + Sync,
        E: Into<anyhow::Error> + 'static,
    {
        Self::Pending(
            fut.map(|outcome| match outcome {
                Ok(value) => Ok(Arc::new(value) as Payload),
                Err(e) => Err(Failure::new(e)),
            })
            .boxed(),
        )
    }

    /// Wrap a future that already speaks payloads and failures.
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Payload, Failure>> + Send + 'static,
    {
        Self::Pending(fut.boxed())
    }

    /// Convert a synchronous result.
    pub fn from_result<T, E>(outcome: Result<T, E>) -> Self
    where
        T: Any + Send + Sync,
        E: Into<anyhow::Error>,
    {
        match outcome {
            Ok(value) => Self::ready(value),
            Err(e) => Self::Ready(Err(Failure::new(e))),
        }
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Computation::Ready(Ok(_)) => f.write_str("Computation::Ready(Ok(..))"),
            Computation::Ready(Err(e)) => write!(f, "Computation::Ready(Err({e}))"),
            Computation::Pending(_) => f.write_str("Computation::Pending(..)"),
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Creators, reducer, and invoker for one named async operation.
///
/// # Example
///
/// ```ignore
/// use cooldux::{Computation, PromiseHandler};
///
/// let handler = PromiseHandler::new("users", "admin")?;
/// assert_eq!(handler.start().kind(), &"admin-users_Start");
///
/// let result = handler
///     .handle(Computation::from_future(fetch_users()), dispatch)
///     .await?;
/// ```
pub struct PromiseHandler {
    name: String,
    options: HandlerOptions,
    start: ActionCreator,
    end: ActionCreator,
    error: ActionCreator,
    initial: Arc<OperationState>,
}

impl PromiseHandler {
    /// Build a handler for operation `name`.
    ///
    /// # Errors
    ///
    /// [`CoolduxError::CacheRequiresNamespace`] if `cache` is set without a namespace.
    pub fn new(
        name: impl Into<String>,
        options: impl Into<HandlerOptions>,
    ) -> Result<Self, CoolduxError> {
        let name = name.into();
        let options = options.into();

        if options.cache && options.namespace().is_none() {
            return Err(CoolduxError::CacheRequiresNamespace { operation: name });
        }

        let prefix = match options.namespace() {
            Some(ns) => format!("{ns}-{name}"),
            None => name.clone(),
        };

        Ok(Self {
            start: ActionCreator::new(format!("{prefix}_Start")),
            end: ActionCreator::new(format!("{prefix}_End")),
            error: ActionCreator::new(format!("{prefix}_Error")),
            initial: Arc::new(OperationState::default()),
            name,
            options,
        })
    }

    /// The operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved options.
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Creator for the Start action.
    pub fn start(&self) -> &ActionCreator {
        &self.start
    }

    /// Creator for the End action.
    pub fn end(&self) -> &ActionCreator {
        &self.end
    }

    /// Creator for the Error action.
    pub fn error(&self) -> &ActionCreator {
        &self.error
    }

    /// The initial sub-state. Always the same `Arc`.
    pub fn initial_state(&self) -> &Arc<OperationState> {
        &self.initial
    }

    /// Returns true if `kind` is one of this handler's three kinds.
    pub fn recognizes(&self, kind: &ActionKind) -> bool {
        kind == self.start.kind() || kind == self.end.kind() || kind == self.error.kind()
    }

    /// Build the Error action for `failure`.
    pub fn error_action(&self, failure: &Failure) -> Action {
        self.error.create(failure.clone())
    }

    /// Drive `computation` through Start/End/Error.
    ///
    /// The returned future resolves to the result, to `None` on failure, or
    /// to `Err` with the original failure when `throw_errors` is set. End or
    /// Error is dispatched when it settles, so it must be polled to completion.
    pub fn handle(&self, computation: Computation, dispatch: Dispatch) -> Settlement {
        self.settle(computation, dispatch, true)
    }

    /// Like [`handle`](Self::handle), with control over whether a pending
    /// computation dispatches Start.
    pub(crate) fn settle(
        &self,
        computation: Computation,
        dispatch: Dispatch,
        announce_start: bool,
    ) -> Settlement {
        match computation {
            Computation::Ready(outcome) => {
                let resolved = self.finisher().finish(outcome, &dispatch);
                future::ready(resolved).boxed()
            }
            Computation::Pending(fut) => {
                if announce_start {
                    debug!(operation = %self.name, kind = %self.start.kind(), "dispatching start");
                    dispatch(self.start.create_empty());
                }
                let finisher = self.finisher();
                async move {
                    let outcome = fut.await;
                    finisher.finish(outcome, &dispatch)
                }
                .boxed()
            }
        }
    }

    fn finisher(&self) -> Finisher {
        Finisher {
            name: self.name.clone(),
            end: self.end.clone(),
            error: self.error.clone(),
            throw_errors: self.options.throw_errors,
        }
    }

    /// Tag a computation for the interception stage.
    ///
    /// Ready computations become [`PendingAction::Sync`], futures
    /// [`PendingAction::Async`].
    pub fn pending(self: &Arc<Self>, computation: Computation) -> PendingAction {
        match computation {
            Computation::Ready(result) => PendingAction::Sync {
                handler: Arc::clone(self),
                result,
            },
            Computation::Pending(computation) => PendingAction::Async {
                handler: Arc::clone(self),
                computation,
            },
        }
    }

    /// The cached invocation factory, present only when caching was requested.
    pub fn cached(self: &Arc<Self>) -> Option<CachedInvocation> {
        if !self.options.cache {
            return None;
        }
        let namespace = self.options.namespace()?.to_string();
        Some(CachedInvocation {
            handler: Arc::clone(self),
            namespace,
        })
    }
}

impl Reducer<OperationState> for PromiseHandler {
    fn reduce(&self, state: Option<Arc<OperationState>>, action: &Action) -> Arc<OperationState> {
        let state = state.unwrap_or_else(|| Arc::clone(&self.initial));

        if self.start.matches(action) {
            Arc::new(OperationState {
                value: state.value.clone(),
                pending: true,
                error: None,
            })
        } else if self.end.matches(action) {
            Arc::new(OperationState {
                value: action.payload.clone(),
                pending: false,
                error: None,
            })
        } else if self.error.matches(action) {
            let failure = action.payload_as::<Failure>().cloned().unwrap_or_else(|| {
                Failure::from(CoolduxError::MissingFailurePayload {
                    kind: action.kind.to_string(),
                })
            });
            Arc::new(OperationState {
                value: state.value.clone(),
                pending: false,
                error: Some(failure),
            })
        } else {
            state
        }
    }
}

impl fmt::Debug for PromiseHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseHandler")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Owned pieces needed to dispatch the outcome after the handler is gone.
struct Finisher {
    name: String,
    end: ActionCreator,
    error: ActionCreator,
    throw_errors: bool,
}

impl Finisher {
    fn finish(
        self,
        outcome: Result<Payload, Failure>,
        dispatch: &Dispatch,
    ) -> Result<Option<Payload>, Failure> {
        match outcome {
            Ok(value) => {
                debug!(operation = %self.name, kind = %self.end.kind(), "dispatching end");
                dispatch(self.end.create_shared(Arc::clone(&value)));
                Ok(Some(value))
            }
            Err(failure) => {
                debug!(
                    operation = %self.name,
                    kind = %self.error.kind(),
                    error = %failure,
                    "dispatching error"
                );
                dispatch(self.error.create(failure.clone()));
                if self.throw_errors {
                    Err(failure)
                } else {
                    warn!(
                        operation = %self.name,
                        error = %failure,
                        "operation failed, resolving to none"
                    );
                    Ok(None)
                }
            }
        }
    }
}

// =============================================================================
// Cached invocation
// =============================================================================

/// Factory for cached invocations of one operation.
///
/// The deferred call runs only on a cache miss, inside the interception stage.
#[derive(Clone)]
pub struct CachedInvocation {
    handler: Arc<PromiseHandler>,
    namespace: String,
}

impl CachedInvocation {
    /// The namespace the cache is read from.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Tag `call` to be run by the interception stage on a cache miss.
    pub fn defer<F>(&self, call: F) -> PendingAction
    where
        F: FnOnce() -> Computation + Send + 'static,
    {
        let call: DeferredCall = Box::new(call);
        PendingAction::Cached {
            handler: Arc::clone(&self.handler),
            namespace: self.namespace.clone(),
            call,
        }
    }
}

impl fmt::Debug for CachedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedInvocation")
            .field("operation", &self.handler.name())
            .field("namespace", &self.namespace)
            .finish()
    }
}
