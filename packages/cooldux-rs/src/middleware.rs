//! Interception stage for tagged pending computations.
//!
//! A [`Pipeline`] runs a chain of [`Middleware`] in front of the store's
//! dispatch. Plain actions travel down the chain untouched. Tagged
//! [`PendingAction`]s are caught by [`PromiseMiddleware`], which dispatches
//! Start/End/Error to the store and hands the caller a [`Settlement`].
//!
//! # Architecture
//!
//! ```text
//! Duck invoker ──► PendingAction
//!                       │
//!                       ▼ Pipeline::dispatch()
//!              ┌── TracingMiddleware ──┐
//!              │                       │
//!              ▼                       │
//!        PromiseMiddleware             │ plain Action
//!              │                       │
//!   Start/End/Error ──► MiddlewareApi::dispatch ──► store (reducer)
//!              │
//!              ▼
//!         Settlement ──► caller
//! ```
//!
//! # Variant Priority
//!
//! 1. **Sync**: already settled; dispatch End (or Error) only, never Start
//! 2. **Cached**: read the namespace slice; hit → End only, miss → Start and
//!    run the deferred call, missing namespace → Error only
//! 3. **Async**: Start, then End or Error on settlement
//!
//! # Ordering
//!
//! For one pending action, Start (if any) is dispatched before the returned
//! settlement is first polled, and exactly one of End/Error follows when it
//! completes. Actions emitted by the interception stage go through the
//! dispatch held in [`MiddlewareApi`], which re-enters the pipeline from its
//! first stage.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::action::{Action, Payload};
use crate::combined::CombinedState;
use crate::error::{CoolduxError, Failure};
use crate::handler::{Computation, PromiseHandler};

/// The store's dispatch function.
pub type Dispatch = Arc<dyn Fn(Action) -> Action + Send + Sync>;

/// Outcome handed back for an intercepted computation.
///
/// Resolves to the result, to `None` for a swallowed failure, or to `Err`
/// when the handler was built with `throw_errors`.
pub type Settlement = BoxFuture<'static, Result<Option<Payload>, Failure>>;

/// Work deferred until a cache miss.
pub type DeferredCall = Box<dyn FnOnce() -> Computation + Send>;

/// Wrap a closure as a [`Dispatch`].
pub fn dispatch_fn<F>(f: F) -> Dispatch
where
    F: Fn(Action) -> Action + Send + Sync + 'static,
{
    Arc::new(f)
}

// =============================================================================
// Tagged values
// =============================================================================

/// A computation tagged for the interception stage.
///
/// Carries the handler (operation name and options) plus whatever is needed
/// to produce the outcome. Consumed exactly once.
pub enum PendingAction {
    /// Already settled.
    Sync {
        /// Handler for the operation.
        handler: Arc<PromiseHandler>,
        /// The settled outcome.
        result: Result<Payload, Failure>,
    },
    /// Resolved from the namespace slice when possible.
    Cached {
        /// Handler for the operation.
        handler: Arc<PromiseHandler>,
        /// Namespace slice to read the cached value from.
        namespace: String,
        /// Run on a cache miss.
        call: DeferredCall,
    },
    /// Still running.
    Async {
        /// Handler for the operation.
        handler: Arc<PromiseHandler>,
        /// The running computation.
        computation: BoxFuture<'static, Result<Payload, Failure>>,
    },
}

impl PendingAction {
    /// Handler carried by the tag.
    pub fn handler(&self) -> &Arc<PromiseHandler> {
        match self {
            PendingAction::Sync { handler, .. }
            | PendingAction::Cached { handler, .. }
            | PendingAction::Async { handler, .. } => handler,
        }
    }

    /// Operation name carried by the tag.
    pub fn operation(&self) -> &str {
        self.handler().name()
    }

    fn variant(&self) -> &'static str {
        match self {
            PendingAction::Sync { .. } => "sync",
            PendingAction::Cached { .. } => "cached",
            PendingAction::Async { .. } => "async",
        }
    }
}

impl fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAction")
            .field("variant", &self.variant())
            .field("operation", &self.operation())
            .finish_non_exhaustive()
    }
}

/// Anything that can be handed to [`Pipeline::dispatch`].
#[derive(Debug)]
pub enum Dispatchable {
    /// A plain action for the store.
    Action(Action),
    /// A tagged computation for the interception stage.
    Pending(PendingAction),
}

impl From<Action> for Dispatchable {
    fn from(action: Action) -> Self {
        Dispatchable::Action(action)
    }
}

impl From<PendingAction> for Dispatchable {
    fn from(pending: PendingAction) -> Self {
        Dispatchable::Pending(pending)
    }
}

/// What the pipeline returns.
pub enum Dispatched {
    /// The store's return value for a plain action.
    Action(Action),
    /// The outcome of an intercepted computation.
    Settled(Settlement),
}

impl Dispatched {
    /// The returned action, if this was a plain dispatch.
    pub fn into_action(self) -> Option<Action> {
        match self {
            Dispatched::Action(action) => Some(action),
            Dispatched::Settled(_) => None,
        }
    }

    /// Await the outcome. A plain action resolves to its own payload.
    pub async fn settled(self) -> Result<Option<Payload>, Failure> {
        match self {
            Dispatched::Action(action) => Ok(action.payload),
            Dispatched::Settled(settlement) => settlement.await,
        }
    }
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatched::Action(action) => {
                f.debug_tuple("Dispatched::Action").field(action).finish()
            }
            Dispatched::Settled(_) => f.write_str("Dispatched::Settled(..)"),
        }
    }
}

// =============================================================================
// Store API
// =============================================================================

/// Root state that exposes combined slices by namespace.
///
/// Cached invocations read `namespace → operation → value` through this.
pub trait NamespacedState: Send + Sync {
    /// The combined slice stored under `namespace`.
    fn namespace(&self, namespace: &str) -> Option<&CombinedState>;
}

impl NamespacedState for HashMap<String, CombinedState> {
    fn namespace(&self, namespace: &str) -> Option<&CombinedState> {
        self.get(namespace)
    }
}

impl NamespacedState for BTreeMap<String, CombinedState> {
    fn namespace(&self, namespace: &str) -> Option<&CombinedState> {
        self.get(namespace)
    }
}

/// The `{dispatch, get_state}` pair middleware receives from the store.
pub struct MiddlewareApi<S> {
    dispatch: Dispatch,
    get_state: Arc<dyn Fn() -> Arc<S> + Send + Sync>,
}

impl<S> MiddlewareApi<S> {
    /// Create the API from the store's dispatch and state accessor.
    pub fn new<G>(dispatch: Dispatch, get_state: G) -> Self
    where
        G: Fn() -> Arc<S> + Send + Sync + 'static,
    {
        Self {
            dispatch,
            get_state: Arc::new(get_state),
        }
    }

    /// Dispatch a plain action to the store.
    pub fn dispatch(&self, action: Action) -> Action {
        (self.dispatch)(action)
    }

    /// A clone of the store's dispatch.
    pub fn dispatcher(&self) -> Dispatch {
        Arc::clone(&self.dispatch)
    }

    /// Snapshot of the store's current state.
    pub fn get_state(&self) -> Arc<S> {
        (self.get_state)()
    }
}

impl<S> Clone for MiddlewareApi<S> {
    fn clone(&self) -> Self {
        Self {
            dispatch: Arc::clone(&self.dispatch),
            get_state: Arc::clone(&self.get_state),
        }
    }
}

impl<S> fmt::Debug for MiddlewareApi<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareApi").finish_non_exhaustive()
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// The next stage in the pipeline.
pub type Next<'a> = &'a dyn Fn(Dispatchable) -> Dispatched;

/// A pipeline stage.
///
/// Receives the store API, the value being dispatched, and the next stage.
/// A stage that does not care about a value passes it to `next` and returns
/// what `next` returns.
pub trait Middleware<S>: Send + Sync {
    /// Handle one dispatched value.
    fn handle(&self, api: &MiddlewareApi<S>, action: Dispatchable, next: Next<'_>) -> Dispatched;
}

/// Intercepts [`PendingAction`]s and drives them through Start/End/Error.
///
/// A cached value is any `Some` in the operation slice. Payloads are opaque,
/// so a stored `false`, `0` or empty string is still a hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromiseMiddleware;

impl PromiseMiddleware {
    /// Create the middleware.
    pub fn new() -> Self {
        Self
    }

    fn cached<S: NamespacedState>(
        api: &MiddlewareApi<S>,
        handler: Arc<PromiseHandler>,
        namespace: String,
        call: DeferredCall,
    ) -> Settlement {
        let dispatch = api.dispatcher();
        let state = api.get_state();

        let Some(slice) = state.namespace(&namespace) else {
            let failure = Failure::from(CoolduxError::NamespaceMissing {
                namespace,
                operation: handler.name().to_string(),
            });
            return handler.settle(Computation::Ready(Err(failure)), dispatch, false);
        };

        if let Some(cached) = slice.value(handler.name()) {
            debug!(operation = handler.name(), %namespace, "cache hit");
            return handler.settle(Computation::ready_shared(Arc::clone(cached)), dispatch, false);
        }

        debug!(operation = handler.name(), %namespace, "cache miss");
        dispatch(handler.start().create_empty());
        handler.settle(call(), dispatch, false)
    }
}

impl<S> Middleware<S> for PromiseMiddleware
where
    S: NamespacedState,
{
    fn handle(&self, api: &MiddlewareApi<S>, action: Dispatchable, next: Next<'_>) -> Dispatched {
        let pending = match action {
            Dispatchable::Pending(pending) => pending,
            other => return next(other),
        };

        let settlement = match pending {
            PendingAction::Sync { handler, result } => {
                handler.settle(Computation::Ready(result), api.dispatcher(), false)
            }
            PendingAction::Cached {
                handler,
                namespace,
                call,
            } => Self::cached(api, handler, namespace, call),
            PendingAction::Async {
                handler,
                computation,
            } => handler.settle(Computation::Pending(computation), api.dispatcher(), true),
        };

        Dispatched::Settled(settlement)
    }
}

/// Logs every value passing through at `debug`, then forwards it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl<S> Middleware<S> for TracingMiddleware {
    fn handle(&self, _api: &MiddlewareApi<S>, action: Dispatchable, next: Next<'_>) -> Dispatched {
        match &action {
            Dispatchable::Action(action) => debug!(kind = %action.kind, "dispatch action"),
            Dispatchable::Pending(pending) => debug!(
                operation = pending.operation(),
                variant = pending.variant(),
                "dispatch pending"
            ),
        }
        next(action)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Middleware composed in front of the store's dispatch.
///
/// Stages run in the order they were added. The [`MiddlewareApi`] handed to
/// each stage dispatches back through the whole pipeline, so actions emitted
/// by a stage (Start, End, Error) are seen by every stage before the store.
/// The last stage hands plain actions to the store.
///
/// A pending action that reaches the store was never intercepted. It settles
/// through its handler's Error path with [`CoolduxError::Unintercepted`].
///
/// # Example
///
/// ```ignore
/// use cooldux::{MiddlewareApi, Pipeline, PromiseMiddleware, TracingMiddleware};
///
/// let pipeline = Pipeline::new(MiddlewareApi::new(store_dispatch, store_state))
///     .with(TracingMiddleware)
///     .with(PromiseMiddleware::new());
///
/// let users = pipeline.dispatch(duck.invoker("users")?.invoke(())).settled().await?;
/// ```
pub struct Pipeline<S> {
    chain: Arc<Chain<S>>,
}

impl<S: 'static> Pipeline<S> {
    /// A pipeline with no stages in front of `store`.
    pub fn new(store: MiddlewareApi<S>) -> Self {
        Self {
            chain: Chain::build(store, Vec::new()),
        }
    }

    /// Append a stage.
    pub fn with<M>(self, middleware: M) -> Self
    where
        M: Middleware<S> + 'static,
    {
        let mut stages = self.chain.stages.clone();
        stages.push(Arc::new(middleware));
        Self {
            chain: Chain::build(self.chain.store.clone(), stages),
        }
    }

    /// The API handed to stages. Its dispatch runs the whole pipeline.
    pub fn api(&self) -> &MiddlewareApi<S> {
        &self.chain.api
    }

    /// Send a value through the pipeline.
    pub fn dispatch(&self, action: impl Into<Dispatchable>) -> Dispatched {
        self.chain.run(0, action.into())
    }
}

impl<S> fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.chain.stages.len())
            .finish_non_exhaustive()
    }
}

struct Chain<S> {
    store: MiddlewareApi<S>,
    api: MiddlewareApi<S>,
    stages: Vec<Arc<dyn Middleware<S>>>,
}

impl<S: 'static> Chain<S> {
    fn build(store: MiddlewareApi<S>, stages: Vec<Arc<dyn Middleware<S>>>) -> Arc<Self> {
        Arc::new_cyclic(|chain: &Weak<Self>| {
            let chain = Weak::clone(chain);
            // Settlements can outlive the pipeline; they then reach the store directly.
            let fallback = store.dispatcher();
            let dispatch: Dispatch = Arc::new(move |action: Action| match chain.upgrade() {
                Some(chain) => chain.reenter(action),
                None => fallback(action),
            });
            let api = MiddlewareApi {
                dispatch,
                get_state: Arc::clone(&store.get_state),
            };
            Self { store, api, stages }
        })
    }

    fn reenter(&self, action: Action) -> Action {
        let echo = action.clone();
        match self.run(0, Dispatchable::Action(action)) {
            Dispatched::Action(action) => action,
            Dispatched::Settled(_) => echo,
        }
    }

    fn run(&self, index: usize, action: Dispatchable) -> Dispatched {
        match self.stages.get(index) {
            Some(stage) => stage.handle(&self.api, action, &|action| self.run(index + 1, action)),
            None => self.base(action),
        }
    }

    fn base(&self, action: Dispatchable) -> Dispatched {
        match action {
            Dispatchable::Action(action) => Dispatched::Action(self.store.dispatch(action)),
            Dispatchable::Pending(pending) => {
                warn!(
                    operation = pending.operation(),
                    "pending action reached the store without an interception stage"
                );
                let handler = Arc::clone(pending.handler());
                let failure = Failure::from(CoolduxError::Unintercepted {
                    operation: handler.name().to_string(),
                });
                let settlement =
                    handler.settle(Computation::Ready(Err(failure)), self.api.dispatcher(), false);
                Dispatched::Settled(settlement)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionCreator;
    use crate::handler::HandlerOptions;
    use crate::testing::ActionRecorder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type RootState = HashMap<String, CombinedState>;

    fn pipeline(recorder: &ActionRecorder, root: RootState) -> Pipeline<RootState> {
        let root = Arc::new(root);
        Pipeline::new(MiddlewareApi::new(recorder.dispatch(), move || Arc::clone(&root)))
            .with(TracingMiddleware)
            .with(PromiseMiddleware::new())
    }

    fn handler(options: HandlerOptions) -> Arc<PromiseHandler> {
        Arc::new(PromiseHandler::new("op", options).unwrap())
    }

    fn cached_root(value: Option<&'static str>) -> RootState {
        let slice = Arc::new(crate::handler::OperationState {
            value: value.map(|v| Arc::new(v) as Payload),
            ..Default::default()
        });
        let mut root = RootState::new();
        root.insert("ns".into(), CombinedState::new().with_slice("op", slice));
        root
    }

    #[test]
    fn test_plain_action_passes_through_unchanged() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let shared = crate::action::payload(5u32);
        let action = ActionCreator::new("plain").create_shared(Arc::clone(&shared));

        let returned = pipeline.dispatch(action).into_action().unwrap();

        assert_eq!(returned.kind, "plain");
        assert!(Arc::ptr_eq(returned.payload.as_ref().unwrap(), &shared));
        assert_eq!(recorder.kinds(), vec!["plain"]);
    }

    #[tokio::test]
    async fn test_async_dispatches_start_then_end() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let handler = handler(HandlerOptions::default());

        let pending = handler.pending(Computation::from_future(async {
            Ok::<_, anyhow::Error>("done")
        }));
        let dispatched = pipeline.dispatch(pending);
        assert_eq!(recorder.kinds(), vec!["op_Start"]);

        let result = dispatched.settled().await.unwrap().unwrap();
        assert_eq!(result.downcast_ref::<&str>(), Some(&"done"));
        assert_eq!(recorder.kinds(), vec!["op_Start", "op_End"]);
    }

    #[tokio::test]
    async fn test_sync_dispatches_end_only() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let handler = handler(HandlerOptions::default());

        let result = pipeline
            .dispatch(handler.pending(Computation::ready(3i64)))
            .settled()
            .await
            .unwrap();

        assert_eq!(result.unwrap().downcast_ref::<i64>(), Some(&3));
        assert_eq!(recorder.kinds(), vec!["op_End"]);
    }

    #[tokio::test]
    async fn test_sync_failure_dispatches_error_only() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let handler = handler(HandlerOptions::default());

        let result = pipeline
            .dispatch(handler.pending(Computation::failed(Failure::msg("nope"))))
            .settled()
            .await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(recorder.kinds(), vec!["op_Error"]);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_call() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, cached_root(Some("cached-value")));
        let handler = handler(HandlerOptions::namespaced("ns").with_cache(true));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let pending = handler.cached().unwrap().defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Computation::ready("live-value")
        });
        let result = pipeline.dispatch(pending).settled().await.unwrap().unwrap();

        assert_eq!(result.downcast_ref::<&str>(), Some(&"cached-value"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.kinds(), vec!["ns-op_End"]);
    }

    #[tokio::test]
    async fn test_cache_miss_runs_call() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, cached_root(None));
        let handler = handler(HandlerOptions::namespaced("ns").with_cache(true));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let pending = handler.cached().unwrap().defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Computation::from_future(async { Ok::<_, anyhow::Error>("live-value") })
        });
        let result = pipeline.dispatch(pending).settled().await.unwrap().unwrap();

        assert_eq!(result.downcast_ref::<&str>(), Some(&"live-value"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.kinds(), vec!["ns-op_Start", "ns-op_End"]);
    }

    #[tokio::test]
    async fn test_cache_miss_with_ready_call_still_starts() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, cached_root(None));
        let handler = handler(HandlerOptions::namespaced("ns").with_cache(true));

        let pending = handler.cached().unwrap().defer(|| Computation::ready(9u8));
        pipeline.dispatch(pending).settled().await.unwrap();

        assert_eq!(recorder.kinds(), vec!["ns-op_Start", "ns-op_End"]);
    }

    #[tokio::test]
    async fn test_missing_namespace_routes_through_error() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let handler = handler(
            HandlerOptions::namespaced("ns")
                .with_cache(true)
                .with_throw_errors(true),
        );

        let pending = handler
            .cached()
            .unwrap()
            .defer(|| panic!("deferred call must not run"));
        let err = pipeline.dispatch(pending).settled().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CoolduxError>(),
            Some(CoolduxError::NamespaceMissing { namespace, .. }) if namespace == "ns"
        ));
        assert_eq!(recorder.kinds(), vec!["ns-op_Error"]);
    }

    #[tokio::test]
    async fn test_missing_namespace_without_throw_resolves_none() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let handler = handler(HandlerOptions::namespaced("ns").with_cache(true));

        let pending = handler.cached().unwrap().defer(|| Computation::ready(()));
        let result = pipeline.dispatch(pending).settled().await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(recorder.kinds(), vec!["ns-op_Error"]);
    }

    #[tokio::test]
    async fn test_throw_errors_rejects_after_error_dispatch() {
        let recorder = ActionRecorder::new();
        let pipeline = pipeline(&recorder, RootState::new());
        let handler = handler(HandlerOptions::default().with_throw_errors(true));
        let failure = Failure::msg("boom");
        let thrown = failure.clone();

        let computation = Computation::pending(async move { Err::<Payload, _>(thrown) });
        let pending = handler.pending(computation);
        let err = pipeline.dispatch(pending).settled().await.unwrap_err();

        assert!(err.ptr_eq(&failure));
        assert_eq!(recorder.kinds(), vec!["op_Start", "op_Error"]);
        let error_action = recorder.last().unwrap();
        assert!(error_action.payload_as::<Failure>().unwrap().ptr_eq(&failure));
    }

    fn bare_pipeline(recorder: &ActionRecorder) -> Pipeline<RootState> {
        Pipeline::new(MiddlewareApi::new(recorder.dispatch(), || Arc::new(RootState::new())))
    }

    #[tokio::test]
    async fn test_pending_without_interception_rejects_with_throw_errors() {
        let recorder = ActionRecorder::new();
        let pipeline = bare_pipeline(&recorder);
        let handler = handler(HandlerOptions::default().with_throw_errors(true));

        let err = pipeline
            .dispatch(handler.pending(Computation::ready(1u8)))
            .settled()
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CoolduxError>(),
            Some(CoolduxError::Unintercepted { .. })
        ));
        assert_eq!(recorder.kinds(), vec!["op_Error"]);
    }

    #[tokio::test]
    async fn test_pending_without_interception_resolves_none() {
        let recorder = ActionRecorder::new();
        let pipeline = bare_pipeline(&recorder);
        let handler = handler(HandlerOptions::default());

        let result = pipeline
            .dispatch(handler.pending(Computation::ready(1u8)))
            .settled()
            .await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(recorder.kinds(), vec!["op_Error"]);
        let failure = recorder.last().unwrap();
        assert!(matches!(
            failure.payload_as::<Failure>().unwrap().downcast_ref::<CoolduxError>(),
            Some(CoolduxError::Unintercepted { .. })
        ));
    }

    struct SpyStage {
        seen: ActionRecorder,
    }

    impl<S> Middleware<S> for SpyStage {
        fn handle(
            &self,
            _api: &MiddlewareApi<S>,
            action: Dispatchable,
            next: Next<'_>,
        ) -> Dispatched {
            if let Dispatchable::Action(action) = &action {
                (self.seen.dispatch())(action.clone());
            }
            next(action)
        }
    }

    #[tokio::test]
    async fn test_earlier_stage_sees_emitted_actions() {
        let store = ActionRecorder::new();
        let seen = ActionRecorder::new();
        let pipeline = bare_pipeline(&store)
            .with(SpyStage { seen: seen.clone() })
            .with(PromiseMiddleware::new());
        let handler = handler(HandlerOptions::default());

        let pending = handler.pending(Computation::from_future(async {
            Ok::<_, anyhow::Error>(1u8)
        }));
        pipeline.dispatch(pending).settled().await.unwrap();

        assert_eq!(seen.kinds(), vec!["op_Start", "op_End"]);
        assert_eq!(store.kinds(), vec!["op_Start", "op_End"]);
    }

    #[test]
    fn test_api_dispatch_runs_every_stage() {
        let store = ActionRecorder::new();
        let seen = ActionRecorder::new();
        let pipeline = bare_pipeline(&store).with(SpyStage { seen: seen.clone() });

        let returned = pipeline.api().dispatch(Action::empty("plain"));

        assert_eq!(returned.kind, "plain");
        assert_eq!(seen.kinds(), vec!["plain"]);
        assert_eq!(store.kinds(), vec!["plain"]);
    }

    #[tokio::test]
    async fn test_any_stored_value_is_a_cache_hit() {
        let recorder = ActionRecorder::new();
        let slice = Arc::new(crate::handler::OperationState {
            value: Some(crate::action::payload(false)),
            ..Default::default()
        });
        let mut root = RootState::new();
        root.insert("ns".into(), CombinedState::new().with_slice("op", slice));
        let pipeline = pipeline(&recorder, root);
        let handler = handler(HandlerOptions::namespaced("ns").with_cache(true));

        let pending = handler
            .cached()
            .unwrap()
            .defer(|| panic!("stored false must short-circuit the call"));
        let result = pipeline.dispatch(pending).settled().await.unwrap().unwrap();

        assert_eq!(result.downcast_ref::<bool>(), Some(&false));
        assert_eq!(recorder.kinds(), vec!["ns-op_End"]);
    }

    #[test]
    fn test_namespaced_state_lookup() {
        let mut root = BTreeMap::new();
        root.insert("ns".to_string(), CombinedState::new());
        assert!(root.namespace("ns").is_some());
        assert!(root.namespace("missing").is_none());
    }
}
