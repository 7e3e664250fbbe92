// crates/dbmonitor-core/src/context.rs
// ============================================================================
// Module: Client Context
// Description: Collaborators shared by a registry and its connections.
// Purpose: Hold the transport, catalog, settings, and event sink in one place.
// Dependencies: std
// ============================================================================

//! ## Overview
//! One [`ClientContext`] is created per registry and shared by every
//! connection it produces.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::catalog::ProcedureCatalog;
use crate::events::ClientEvent;
use crate::events::ClientEventSink;
use crate::settings::ClientSettings;
use crate::transport::Transport;

/// Shared collaborators for connections.
pub(crate) struct ClientContext {
    /// Transport used for every call.
    pub(crate) transport: Arc<dyn Transport>,
    /// Procedure signatures.
    pub(crate) catalog: Arc<ProcedureCatalog>,
    /// Deadlines and endpoint layout.
    pub(crate) settings: ClientSettings,
    /// Event sink for lifecycle and failure records.
    pub(crate) events: Arc<dyn ClientEventSink>,
    /// When false, encoded calls are not sent and resolve through their deadline.
    server_connected: AtomicBool,
}

impl ClientContext {
    /// Creates a context with the server marked as connected.
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        catalog: Arc<ProcedureCatalog>,
        settings: ClientSettings,
        events: Arc<dyn ClientEventSink>,
    ) -> Self {
        Self {
            transport,
            catalog,
            settings,
            events,
            server_connected: AtomicBool::new(true),
        }
    }

    /// Returns whether calls are currently sent.
    pub(crate) fn is_server_connected(&self) -> bool {
        self.server_connected.load(Ordering::Acquire)
    }

    /// Updates the connected gate.
    pub(crate) fn set_server_connected(&self, connected: bool) {
        self.server_connected.store(connected, Ordering::Release);
    }

    /// Records an event on the configured sink.
    pub(crate) fn record(&self, event: &ClientEvent) {
        self.events.record(event);
    }
}
