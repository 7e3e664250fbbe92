// crates/dbmonitor-core/src/invocation.rs
// ============================================================================
// Module: Timeout-Guarded Invocation
// Description: Single-shot response callback raced against a deadline.
// Purpose: Resolve every call exactly once, with a response or a timeout.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`GuardedCallback`] wraps a response callback and starts a deadline timer
//! on construction. Whichever of [`GuardedCallback::complete`] or the timer
//! happens first wins; every later attempt is ignored. The guard is cheap to
//! clone so a transport may hold one copy while the timer holds another.
//! Invariants:
//! - The wrapped callback fires at most once.
//! - A response arriving first cancels the timer.
//! - The underlying transport request is never cancelled; late responses are
//!   discarded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::response::ProcedureResponse;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Callback invoked with the final response.
type ResponseCallback = Box<dyn FnOnce(ProcedureResponse) + Send + 'static>;

/// How a guarded call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The real response arrived before the deadline.
    Responded,
    /// The deadline elapsed first.
    TimedOut,
}

/// Mutable guard state.
struct GuardState {
    /// Callback; taken on first resolution.
    callback: Option<ResponseCallback>,
    /// Deadline timer task, aborted when a response wins.
    timer: Option<AbortHandle>,
    /// Resolution, once known.
    outcome: Option<GuardOutcome>,
}

/// Callback wrapper that fires exactly once before or at its deadline.
///
/// # Invariants
/// - `outcome` transitions from `None` exactly once.
#[derive(Clone)]
pub struct GuardedCallback {
    /// Shared state between the caller, transport, and timer.
    inner: Arc<Mutex<GuardState>>,
}

impl GuardedCallback {
    /// Wraps `callback` and starts the deadline timer.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new<F>(deadline: Duration, callback: F) -> Self
    where
        F: FnOnce(ProcedureResponse) + Send + 'static,
    {
        let guard = Self {
            inner: Arc::new(Mutex::new(GuardState {
                callback: Some(Box::new(callback)),
                timer: None,
                outcome: None,
            })),
        };
        let timer_guard = guard.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            timer_guard.resolve(ProcedureResponse::timeout(), GuardOutcome::TimedOut);
        });
        let mut state = guard.lock();
        if state.outcome.is_none() {
            state.timer = Some(timer.abort_handle());
        }
        drop(state);
        guard
    }

    /// Delivers the real response.
    ///
    /// Returns `true` when this call fired the callback, `false` when the
    /// guard was already resolved (by the timer or an earlier response).
    pub fn complete(&self, response: ProcedureResponse) -> bool {
        self.resolve(response, GuardOutcome::Responded)
    }

    /// Returns how the guard was resolved, if it has been.
    #[must_use]
    pub fn outcome(&self) -> Option<GuardOutcome> {
        self.lock().outcome
    }

    /// Returns true once the callback has fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.outcome().is_some()
    }

    /// Resolves the guard once; later calls are no-ops.
    fn resolve(&self, response: ProcedureResponse, outcome: GuardOutcome) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome);
        let callback = state.callback.take();
        let timer = state.timer.take();
        drop(state);
        if outcome == GuardOutcome::Responded
            && let Some(timer) = timer
        {
            timer.abort();
        }
        callback.is_some_and(|callback| {
            callback(response);
            true
        })
    }

    /// Locks guard state; the state stays consistent even after a poisoning panic.
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
