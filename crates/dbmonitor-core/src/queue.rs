// crates/dbmonitor-core/src/queue.rs
// ============================================================================
// Module: Sequential Execution Queue
// Description: Ordered, one-at-a-time runner for procedure calls.
// Purpose: Serialize independently enqueued calls and aggregate their outcome.
// Dependencies: serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! A [`SequentialQueue`] runs enqueued calls against one [`Connection`] in
//! enqueue order, awaiting each guarded call before dispatching the next.
//! The queue tracks a single success flag: any non-success status or failing
//! item callback clears it. Unless the queue was started with
//! `continue_on_failure`, the first failure stops further dispatch. When the
//! sequence is exhausted or stopped the completion handler runs once with the
//! accumulated flag.
//!
//! State machine: `Idle -> Started -> Draining -> Idle`.
//! Invariants:
//! - At most one item is in flight at any instant.
//! - Items run in enqueue order.
//! - Completion handler failures are recorded, never propagated.
//! - Callback and handler panics are contained and treated as failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::collections::VecDeque;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::events::ClientEvent;
use crate::events::ClientEventKind;
use crate::response::ProcedureResponse;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure reported by a per-item callback; marks the sequence failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("queue item callback failed: {0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    /// Creates a callback error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure reported by a completion handler; recorded and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("queue completion handler failed: {0}")]
pub struct CompletionError(pub String);

impl CompletionError {
    /// Creates a completion error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Per-item response callback.
type ItemCallback = Box<dyn FnOnce(&ProcedureResponse) -> Result<(), CallbackError> + Send>;
/// Completion handler with its caller state already bound.
type CompletionHandler = Box<dyn FnOnce(bool) -> Result<(), CompletionError> + Send>;

/// Queue lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Not started, or finished draining.
    Idle,
    /// Started and accepting items; not yet draining.
    Started,
    /// Drive loop is dispatching items.
    Draining,
}

/// One enqueued call.
struct QueueItem {
    /// Procedure name.
    procedure: String,
    /// Positional parameters.
    parameters: Vec<Value>,
    /// Optional response callback.
    callback: Option<ItemCallback>,
}

/// Mutable queue state.
struct QueueState {
    /// Lifecycle state.
    status: QueueStatus,
    /// Whether dispatch continues after a failure.
    continue_on_failure: bool,
    /// Accumulated success flag.
    success: bool,
    /// Pending items in enqueue order.
    items: VecDeque<QueueItem>,
    /// Completion handler, fired once when the drive loop stops.
    on_complete: Option<CompletionHandler>,
}

/// What the drive loop does next.
enum Step {
    /// Dispatch this item.
    Dispatch(QueueItem),
    /// Stop and run the handler with the accumulated flag.
    Complete(Option<CompletionHandler>, bool),
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Ordered call runner bound to one connection.
///
/// Clones share the same sequence.
#[derive(Clone)]
pub struct SequentialQueue {
    /// Connection every item is dispatched through.
    connection: Arc<Connection>,
    /// Shared sequence state.
    state: Arc<Mutex<QueueState>>,
}

impl SequentialQueue {
    /// Creates an idle queue for the connection.
    pub(crate) fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            state: Arc::new(Mutex::new(QueueState {
                status: QueueStatus::Idle,
                continue_on_failure: false,
                success: true,
                items: VecDeque::new(),
                on_complete: None,
            })),
        }
    }

    /// Starts a new sequence.
    ///
    /// Returns `false` without changing anything while the queue is draining.
    /// Otherwise resets the success flag and clears any completion handler.
    pub fn start(&self, continue_on_failure: bool) -> bool {
        let mut state = self.lock();
        if state.status == QueueStatus::Draining {
            return false;
        }
        state.status = QueueStatus::Started;
        state.continue_on_failure = continue_on_failure;
        state.success = true;
        state.on_complete = None;
        true
    }

    /// Appends a call with a response callback.
    pub fn enqueue<F>(
        &self,
        procedure: impl Into<String>,
        parameters: Vec<Value>,
        callback: F,
    ) -> &Self
    where
        F: FnOnce(&ProcedureResponse) -> Result<(), CallbackError> + Send + 'static,
    {
        self.push(QueueItem {
            procedure: procedure.into(),
            parameters,
            callback: Some(Box::new(callback)),
        })
    }

    /// Appends a call whose response only affects the success flag.
    pub fn enqueue_call(&self, procedure: impl Into<String>, parameters: Vec<Value>) -> &Self {
        self.push(QueueItem {
            procedure: procedure.into(),
            parameters,
            callback: None,
        })
    }

    /// Stores the completion handler and starts draining if not already.
    ///
    /// `handler` receives `state` and the accumulated success flag. Returns a
    /// [`QueueRun`] when this call started the drive loop, `None` when the
    /// queue was already draining (the new handler replaces the old one).
    ///
    /// # Panics
    ///
    /// Panics when the drive loop must be started outside a Tokio runtime.
    pub fn finalize<S, F>(&self, handler: F, state: S) -> Option<QueueRun>
    where
        S: Send + 'static,
        F: FnOnce(S, bool) -> Result<(), CompletionError> + Send + 'static,
    {
        let mut guard = self.lock();
        guard.on_complete = Some(Box::new(move |success| handler(state, success)));
        if guard.status == QueueStatus::Draining {
            return None;
        }
        guard.status = QueueStatus::Draining;
        drop(guard);
        let queue = self.clone();
        Some(QueueRun {
            handle: tokio::spawn(queue.drain()),
        })
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        self.lock().status
    }

    /// Returns the number of items not yet dispatched.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns the accumulated success flag.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.lock().success
    }

    /// Appends an item to the sequence.
    fn push(&self, item: QueueItem) -> &Self {
        self.lock().items.push_back(item);
        self
    }

    /// Drive loop: dispatches one item at a time, then runs the handler.
    async fn drain(self) -> bool {
        loop {
            let step = self.next_step();
            match step {
                Step::Dispatch(item) => self.dispatch(item).await,
                Step::Complete(handler, success) => {
                    if let Some(handler) = handler
                        && let Err(err) = contain(|| handler(success), CompletionError::new)
                    {
                        self.connection.record(
                            &ClientEvent::new(
                                ClientEventKind::CompletionHandlerError,
                                self.connection.key(),
                            )
                            .with_message(err.to_string()),
                        );
                    }
                    return success;
                }
            }
        }
    }

    /// Pops the next item, or transitions to idle when the run is over.
    fn next_step(&self) -> Step {
        let mut state = self.lock();
        let proceed = state.success || state.continue_on_failure;
        match state.items.pop_front().filter(|_| proceed) {
            Some(item) => Step::Dispatch(item),
            None => {
                state.items.clear();
                state.status = QueueStatus::Idle;
                Step::Complete(state.on_complete.take(), state.success)
            }
        }
    }

    /// Executes one item and folds its outcome into the success flag.
    async fn dispatch(&self, item: QueueItem) {
        let response = self.connection.execute(&item.procedure, item.parameters).await;
        let mut failed = !response.is_success();
        if let Some(callback) = item.callback
            && let Err(err) = contain(|| callback(&response), CallbackError::new)
        {
            failed = true;
            self.connection.record(
                &ClientEvent::new(ClientEventKind::CallbackError, self.connection.key())
                    .with_procedure(item.procedure)
                    .with_status(response.status)
                    .with_message(err.to_string()),
            );
        }
        if failed {
            self.lock().success = false;
        }
    }

    /// Locks queue state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Panic Containment
// ============================================================================

/// Runs a caller-supplied callback, turning a panic into an error.
///
/// The drive loop must always reach its completion step, so a panicking
/// callback is reported like a returned error.
fn contain<E, F>(callback: F, to_error: fn(String) -> E) -> Result<(), E>
where
    F: FnOnce() -> Result<(), E>,
{
    panic::catch_unwind(AssertUnwindSafe(callback))
        .unwrap_or_else(|payload| Err(to_error(panic_message(payload.as_ref()))))
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("panicked: {detail}")
}

// ============================================================================
// SECTION: Queue Run
// ============================================================================

/// Handle to a running drive loop.
pub struct QueueRun {
    /// Drive loop task.
    handle: JoinHandle<bool>,
}

impl QueueRun {
    /// Waits for the drive loop and returns the accumulated success flag.
    ///
    /// Returns `false` if the drive loop task was cancelled.
    pub async fn wait(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}
