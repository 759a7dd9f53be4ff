//! Actions and action creators.
//!
//! An [`Action`] is a `{kind, payload}` record. The `kind` routes the action
//! to whatever reducer recognizes it; the payload is opaque to cooldux and is
//! shared by `Arc`, so the value a reducer sees is the exact value the caller
//! passed in.
//!
//! # Example
//!
//! ```ignore
//! use cooldux::ActionCreator;
//!
//! let rename = ActionCreator::new("profile-RENAME");
//! let action = rename.create("Ada".to_string());
//!
//! assert_eq!(action.kind, *rename.kind());
//! assert_eq!(action.payload_as::<String>().map(String::as_str), Some("Ada"));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// Type-erased, shared action payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Wrap a value as a [`Payload`].
pub fn payload<T: Any + Send + Sync>(value: T) -> Payload {
    Arc::new(value)
}

/// String discriminator identifying an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKind(Arc<str>);

impl ActionKind {
    /// Create a kind from any string.
    pub fn new(kind: impl Into<Arc<str>>) -> Self {
        Self(kind.into())
    }

    /// The discriminator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl From<String> for ActionKind {
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

impl PartialEq<str> for ActionKind {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ActionKind {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request for a state transition.
#[derive(Clone)]
pub struct Action {
    /// Discriminator used for routing.
    pub kind: ActionKind,
    /// Opaque payload, if any.
    pub payload: Option<Payload>,
}

impl Action {
    /// Create an action carrying a payload.
    pub fn new(kind: impl Into<ActionKind>, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }

    /// Create an action with no payload.
    pub fn empty(kind: impl Into<ActionKind>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Downcast the payload to a concrete type.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    /// Returns true if this action has the given kind.
    pub fn is(&self, kind: &ActionKind) -> bool {
        &self.kind == kind
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Source of generated discriminators.
///
/// Kinds look like `RAND_<n>_<uuid>`: `n` is a monotonic counter, the suffix a
/// v4 UUID. Collisions with hand-picked kinds are not expected in practice,
/// but the generator is not a security boundary.
#[derive(Debug)]
pub struct KindGenerator {
    counter: AtomicU64,
}

static GLOBAL_KINDS: KindGenerator = KindGenerator::new();

impl KindGenerator {
    /// Create a generator with its counter at zero.
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// The process-wide generator used by [`ActionCreator::random`].
    pub fn global() -> &'static KindGenerator {
        &GLOBAL_KINDS
    }

    /// Produce the next kind.
    pub fn next_kind(&self) -> ActionKind {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        ActionKind::from(format!("RAND_{}_{}", index, Uuid::new_v4().simple()))
    }

    /// Number of kinds produced so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for KindGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps payloads into actions of a fixed kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionCreator {
    kind: ActionKind,
}

impl ActionCreator {
    /// Create a creator for the given kind.
    pub fn new(kind: impl Into<ActionKind>) -> Self {
        Self { kind: kind.into() }
    }

    /// Create a creator with a generated, process-unique kind.
    pub fn random() -> Self {
        Self::from_generator(KindGenerator::global())
    }

    /// Create a creator whose kind comes from `generator`.
    pub fn from_generator(generator: &KindGenerator) -> Self {
        Self {
            kind: generator.next_kind(),
        }
    }

    /// The discriminator of actions this creator builds.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Build an action carrying `payload`.
    pub fn create(&self, payload: impl Any + Send + Sync) -> Action {
        Action::new(self.kind.clone(), Arc::new(payload))
    }

    /// Build an action carrying an already shared payload.
    pub fn create_shared(&self, payload: Payload) -> Action {
        Action::new(self.kind.clone(), payload)
    }

    /// Build an action with no payload.
    pub fn create_empty(&self) -> Action {
        Action::empty(self.kind.clone())
    }

    /// Returns true if `action` was built by a creator of this kind.
    pub fn matches(&self, action: &Action) -> bool {
        action.is(&self.kind)
    }
}
