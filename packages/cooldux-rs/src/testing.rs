//! Testing utilities for reducers, handlers and pipelines.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! cooldux = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use cooldux::testing::ActionRecorder;
//!
//! let recorder = ActionRecorder::new();
//! handler.handle(computation, recorder.dispatch()).await?;
//!
//! assert_eq!(recorder.kinds(), vec!["users_Start", "users_End"]);
//! let state = replay(&handler, &recorder.actions());
//! ```
//!
//! ## Using `ActionLatch` for Spawned Work
//!
//! ```ignore
//! let latch = Arc::new(ActionLatch::new(2));
//! let dispatch = recorder.dispatch_with_latch(Arc::clone(&latch));
//!
//! tokio::spawn(handler.handle(computation, dispatch));
//!
//! latch.await_zero().await; // Start and End have both arrived
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::action::Action;
use crate::middleware::{dispatch_fn, Dispatch};
use crate::reducer::Reducer;

/// Dispatch sink that records every action it receives.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ActionRecorder {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl ActionRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<Action>> {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A dispatch function that records and echoes each action.
    pub fn dispatch(&self) -> Dispatch {
        let recorder = self.clone();
        dispatch_fn(move |action| {
            recorder.log().push(action.clone());
            action
        })
    }

    /// Like [`dispatch`](Self::dispatch), also counting down `latch`.
    pub fn dispatch_with_latch(&self, latch: Arc<ActionLatch>) -> Dispatch {
        let recorder = self.clone();
        dispatch_fn(move |action| {
            recorder.log().push(action.clone());
            latch.dec();
            action
        })
    }

    /// Every recorded action, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.log().clone()
    }

    /// Kinds of every recorded action, oldest first.
    pub fn kinds(&self) -> Vec<String> {
        self.log()
            .iter()
            .map(|action| action.kind.to_string())
            .collect()
    }

    /// The most recent action.
    pub fn last(&self) -> Option<Action> {
        self.log().last().cloned()
    }

    /// Number of recorded actions.
    pub fn len(&self) -> usize {
        self.log().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.log().clear();
    }
}

/// Fold `actions` through `reducer`, starting from its own initial state.
///
/// Returns `None` when `actions` is empty.
pub fn replay<S, R>(reducer: &R, actions: &[Action]) -> Option<Arc<S>>
where
    R: Reducer<S>,
{
    actions
        .iter()
        .fold(None, |state, action| Some(reducer.reduce(state, action)))
}

/// Waits until a fixed number of actions have been dispatched.
///
/// Tests should wait for actions, not time.
#[derive(Debug)]
pub struct ActionLatch {
    remaining: AtomicUsize,
    notify: Notify,
}

impl ActionLatch {
    /// Create a latch expecting `expected` actions.
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            notify: Notify::new(),
        }
    }

    /// Count one action.
    ///
    /// # Panics
    ///
    /// Panics if called more times than expected.
    pub fn dec(&self) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            panic!("ActionLatch decremented below zero - more actions than expected");
        }
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Wait for the count to reach zero.
    pub async fn await_zero(&self) {
        loop {
            // Register before checking so a concurrent dec() cannot be missed.
            let notified = self.notify.notified();

            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Current remaining count.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}
