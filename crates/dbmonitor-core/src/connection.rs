// crates/dbmonitor-core/src/connection.rs
// ============================================================================
// Module: Connection
// Description: A deduplicated endpoint through which procedures are invoked.
// Purpose: Issue guarded calls and hold bootstrap metadata and readiness.
// Dependencies: serde_json, tokio
// ============================================================================

//! ## Overview
//! A [`Connection`] pairs a normalized [`ConnectionIdentity`] with the shared
//! client collaborators. Single calls go straight through the catalog and a
//! [`GuardedCallback`]; ordered calls go through a [`SequentialQueue`] obtained
//! from [`Connection::queue`].
//! Invariants:
//! - `ready` flips from false to true at most once and is never reset.
//! - Metadata is written only by bootstrap and queue-driven refreshes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::watch;

use crate::bootstrap;
use crate::bootstrap::ProcedureCommand;
use crate::context::ClientContext;
use crate::events::ClientEvent;
use crate::events::ClientEventKind;
use crate::identity::ConnectionIdentity;
use crate::invocation::GuardedCallback;
use crate::queue::QueueRun;
use crate::queue::SequentialQueue;
use crate::response::ProcedureResponse;

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Logical connection to one server endpoint.
pub struct Connection {
    /// Normalized identity.
    identity: ConnectionIdentity,
    /// Procedure endpoint URL.
    endpoint: String,
    /// Shared collaborators.
    context: Arc<ClientContext>,
    /// Metadata populated by bootstrap.
    metadata: Mutex<BTreeMap<String, Value>>,
    /// Commands compiled for the most recent bootstrap.
    procedure_commands: Mutex<Vec<ProcedureCommand>>,
    /// Readiness flag; only ever set to true.
    ready: watch::Sender<bool>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.identity.key())
            .field("display", &self.identity.display())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection bound to the shared context.
    pub(crate) fn new(identity: ConnectionIdentity, context: Arc<ClientContext>) -> Self {
        let endpoint = identity.endpoint(&context.settings);
        let (ready, _) = watch::channel(false);
        Self {
            identity,
            endpoint,
            context,
            metadata: Mutex::new(BTreeMap::new()),
            procedure_commands: Mutex::new(Vec::new()),
            ready,
        }
    }

    /// Returns the normalized identity.
    #[must_use]
    pub const fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    /// Returns the canonical dedup key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.identity.key()
    }

    /// Returns the display label.
    #[must_use]
    pub fn display(&self) -> &str {
        self.identity.display()
    }

    /// Returns the procedure endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // ------------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------------

    /// Returns true once bootstrap has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Waits until bootstrap has completed.
    pub async fn wait_ready(&self) {
        let mut receiver = self.ready.subscribe();
        let _ = receiver.wait_for(|ready| *ready).await;
    }

    /// Marks the connection ready; returns false when it already was.
    pub(crate) fn mark_ready(&self) -> bool {
        self.ready.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    /// Returns a snapshot of the metadata map.
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, Value> {
        self.lock_metadata().clone()
    }

    /// Returns one metadata entry.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<Value> {
        self.lock_metadata().get(key).cloned()
    }

    /// Stores one metadata entry.
    pub(crate) fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.lock_metadata().insert(key.into(), value);
    }

    /// Returns the commands compiled for the latest bootstrap.
    #[must_use]
    pub fn procedure_commands(&self) -> Vec<ProcedureCommand> {
        self.procedure_commands.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the compiled bootstrap commands.
    pub(crate) fn set_procedure_commands(&self, commands: Vec<ProcedureCommand>) {
        *self.procedure_commands.lock().unwrap_or_else(PoisonError::into_inner) = commands;
    }

    /// Re-runs metadata commands and stores their first result tables.
    ///
    /// Readiness is not affected. Returns the run handle so callers can await
    /// the refresh; the flag reports whether every command succeeded.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn refresh_metadata(self: &Arc<Self>, commands: &[ProcedureCommand]) -> Option<QueueRun> {
        bootstrap::refresh_metadata(self, commands)
    }

    /// Locks the metadata map.
    fn lock_metadata(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.metadata.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Returns a fresh sequential queue bound to this connection.
    #[must_use]
    pub fn queue(self: &Arc<Self>) -> SequentialQueue {
        SequentialQueue::new(Arc::clone(self))
    }

    /// Issues a single call with the default deadline.
    ///
    /// `callback` fires exactly once, with the response or a timeout.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn begin_execute<F>(&self, procedure: &str, parameters: Vec<Value>, callback: F)
    where
        F: FnOnce(ProcedureResponse) + Send + 'static,
    {
        self.begin_execute_with_deadline(
            procedure,
            parameters,
            self.context.settings.call_timeout,
            callback,
        );
    }

    /// Issues a single call with an explicit deadline.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn begin_execute_with_deadline<F>(
        &self,
        procedure: &str,
        parameters: Vec<Value>,
        deadline: Duration,
        callback: F,
    ) where
        F: FnOnce(ProcedureResponse) + Send + 'static,
    {
        let context = Arc::clone(&self.context);
        let key = self.key().to_string();
        let name = procedure.to_string();
        let guard = GuardedCallback::new(deadline, move |response: ProcedureResponse| {
            if response.is_timeout() {
                context.record(
                    &ClientEvent::new(ClientEventKind::CallTimeout, key)
                        .with_procedure(name)
                        .with_status(response.status),
                );
            }
            callback(response);
        });
        self.call_execute(procedure, &parameters, guard);
    }

    /// Issues a single call with the default deadline and awaits the response.
    pub async fn execute(&self, procedure: &str, parameters: Vec<Value>) -> ProcedureResponse {
        self.execute_with_deadline(procedure, parameters, self.context.settings.call_timeout).await
    }

    /// Issues a single call with an explicit deadline and awaits the response.
    pub async fn execute_with_deadline(
        &self,
        procedure: &str,
        parameters: Vec<Value>,
        deadline: Duration,
    ) -> ProcedureResponse {
        let (sender, receiver) = oneshot::channel();
        self.begin_execute_with_deadline(procedure, parameters, deadline, move |response| {
            let _ = sender.send(response);
        });
        receiver.await.unwrap_or_else(|_| ProcedureResponse::timeout())
    }

    /// Encodes the call and hands it to the transport, resolving `guard`.
    fn call_execute(&self, procedure: &str, parameters: &[Value], guard: GuardedCallback) {
        match self.context.catalog.encode(procedure, parameters, &self.identity) {
            Ok(call) => {
                if !self.context.is_server_connected() {
                    return;
                }
                let transport = Arc::clone(&self.context.transport);
                let endpoint = self.endpoint.clone();
                tokio::spawn(async move {
                    let response = transport.send(&endpoint, &call.body).await;
                    guard.complete(response);
                });
            }
            Err(err) => {
                let response = ProcedureResponse::prepare_error(&err);
                self.context.record(
                    &ClientEvent::new(ClientEventKind::EncodingError, self.key())
                        .with_procedure(procedure)
                        .with_status(response.status)
                        .with_message(err.to_string()),
                );
                guard.complete(response);
            }
        }
    }

    /// Records an event for this connection.
    pub(crate) fn record(&self, event: &ClientEvent) {
        self.context.record(event);
    }
}
