//! # Cooldux
//!
//! Helpers that cut the boilerplate of a dispatch/reduce state container:
//! action creators, resettable reducers, and an interception stage that turns
//! async work into Start/End/Error actions with derived pending, success and
//! error state.
//!
//! ## Core Concepts
//!
//! - [`ActionCreator`] = a discriminator plus a constructor for actions of that kind
//! - [`PromiseHandler`] = three creators, a reducer, and an invoker for one operation
//! - [`PromiseMiddleware`] = the stage that recognizes tagged work and drives it
//! - [`Duck`] = a feature's invokers and combined reducer, built from a name map
//!
//! ## Architecture
//!
//! ```text
//! Duck::invoker(name).invoke(arg)
//!     │
//!     ▼ PendingAction (Sync | Cached | Async)
//! Pipeline::dispatch()
//!     │
//!     ├─► TracingMiddleware ──► next
//!     │
//!     └─► PromiseMiddleware
//!             │
//!             ├─► Start ──┐
//!             │           ▼
//!             │     store dispatch ──► Duck::reduce ──► CombinedState
//!             │           ▲
//!             └─► End / Error
//!                     │
//!                     ▼
//!               Settlement ──► caller
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Unrelated actions are free** - every reducer returns the same `Arc` it was given
//! 2. **Start precedes settlement** - Start is dispatched before End or Error
//! 3. **Exactly one outcome** - one End or one Error per settled computation
//! 4. **Failures are shared** - the same [`Failure`] reaches the action, the state and the caller
//! 5. **Reset is global** - every [`ResetReducer`] returns its exact initial state on [`reset()`]
//!
//! ## Example
//!
//! ```ignore
//! use cooldux::{make_duck, DuckAction, HandlerOptions};
//! use cooldux::{MiddlewareApi, Pipeline, PromiseMiddleware};
//!
//! let duck = make_duck(
//!     [
//!         ("select", DuckAction::passthrough()),
//!         ("users", DuckAction::future(|team: Arc<String>| api.fetch_users(team))),
//!     ],
//!     HandlerOptions::namespaced("admin").with_cache(true),
//! )?;
//!
//! let pipeline = Pipeline::new(MiddlewareApi::new(store.dispatcher(), store.state_fn()))
//!     .with(PromiseMiddleware::new());
//!
//! let pending = duck.invoker("users")?.invoke_cached("core".to_string());
//! if let Some(pending) = pending {
//!     let users = pipeline.dispatch(pending).settled().await?;
//! }
//! ```

mod action;
mod combined;
mod duck;
mod error;
mod handler;
mod middleware;
mod reducer;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export action types
pub use action::{payload, Action, ActionCreator, ActionKind, KindGenerator, Payload};

// Re-export reducer types
pub use reducer::{reset, reset_creator, reset_reducer, Reducer, ResetReducer, RESET_KIND};

// Re-export handler types
pub use handler::{
    CachedInvocation, Computation, HandlerOptions, OperationState, OperationStatus, PromiseHandler,
};

// Re-export combined handler types
pub use combined::{CombinedHandler, CombinedState};

// Re-export middleware types
pub use middleware::{
    dispatch_fn, DeferredCall, Dispatch, Dispatchable, Dispatched, Middleware, MiddlewareApi,
    NamespacedState, Next, PendingAction, Pipeline, PromiseMiddleware, Settlement,
    TracingMiddleware,
};

// Re-export duck types
pub use duck::{make_duck, ActionFn, Duck, DuckAction, DuckBuilder, DuckInvoker};

// Re-export error types
pub use error::{CoolduxError, Failure};
