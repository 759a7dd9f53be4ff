//! Structured error types and the shared operation failure.
//!
//! `CoolduxError` covers everything the crate itself raises, so callers can
//! pattern-match instead of string-matching. `Failure` is the value that flows
//! through the Error path of an async operation.
//!
//! # The Failure Rule
//!
//! > **A failure is created once and shared, never rebuilt.**
//!
//! The same `Failure` lands in the Error action payload, in the sub-state
//! `error` field, and (with `throw_errors`) back in the caller's hands.
//! `Failure::ptr_eq` lets callers confirm they got the original.
//!
//! # Example
//!
//! ```ignore
//! use cooldux::{CoolduxError, PromiseHandler, HandlerOptions};
//!
//! match PromiseHandler::new("users", HandlerOptions::default().with_cache(true)) {
//!     Ok(handler) => { /* ... */ }
//!     Err(CoolduxError::CacheRequiresNamespace { operation }) => {
//!         eprintln!("{operation} needs a namespace to cache");
//!     }
//!     Err(other) => eprintln!("setup failed: {other}"),
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by cooldux itself.
///
/// Configuration variants are returned synchronously from constructors.
/// Runtime variants (`NamespaceMissing`, `Unintercepted`) travel inside a
/// [`Failure`] through the normal Error path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoolduxError {
    /// Caching was requested for an operation without a namespace to look it up in.
    #[error("operation {operation} requests caching but has no namespace")]
    CacheRequiresNamespace {
        /// The operation name.
        operation: String,
    },

    /// A duck was given an action with an empty name.
    #[error("duck action names must not be empty")]
    EmptyActionName,

    /// A duck was given the same action name twice.
    #[error("duck action {name} is defined more than once")]
    DuplicateAction {
        /// The repeated name.
        name: String,
    },

    /// Lookup of an action the duck does not define.
    #[error("no duck action named {name}")]
    UnknownAction {
        /// The requested name.
        name: String,
    },

    /// A duck action was invoked with an argument of the wrong type.
    #[error("duck action {operation} expected an argument of type {expected}")]
    ArgumentMismatch {
        /// The operation invoked.
        operation: String,
        /// Type name the action expects.
        expected: &'static str,
    },

    /// A cached invocation ran against a state with no slice for its namespace.
    #[error("namespace {namespace} not found in state while resolving cached {operation}")]
    NamespaceMissing {
        /// The namespace that was looked up.
        namespace: String,
        /// The operation being resolved.
        operation: String,
    },

    /// A pending action reached the store without passing an interception stage.
    #[error("pending action for {operation} reached the store without being intercepted")]
    Unintercepted {
        /// The operation carried by the pending action.
        operation: String,
    },

    /// An Error action arrived whose payload was not a [`Failure`].
    #[error("action {kind} carried no failure payload")]
    MissingFailurePayload {
        /// Kind of the offending action.
        kind: String,
    },
}

/// A shared operation failure.
///
/// Cheap to clone; every clone points at the same underlying error.
#[derive(Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    /// Wrap any error as a failure.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    /// Build a failure from a plain message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Returns true if both failures are the same instance.
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Downcast to a concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Access the underlying error.
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<CoolduxError> for Failure {
    fn from(error: CoolduxError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&*self.0).finish()
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.0)
    }
}
