// crates/dbmonitor-core/src/registry.rs
// ============================================================================
// Module: Connection Registry
// Description: Keyed store of live connections and connection probes.
// Purpose: Deduplicate connections and start their bootstrap.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`ConnectionRegistry`] is an explicit, injectable object that owns the
//! shared client collaborators and a map from canonical key to connection.
//! Adding a descriptor builds its identity, stores the connection under its key
//! (overwriting any previous entry), and starts the two-phase bootstrap.
//! Invariants:
//! - The map never holds two entries with equal keys.
//! - Lookups use the same key derivation as registration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

use crate::bootstrap;
use crate::bootstrap::OnConnectionAdded;
use crate::bootstrap::ProcedureCommand;
use crate::catalog::ProcedureCatalog;
use crate::connection::Connection;
use crate::context::ClientContext;
use crate::events::ClientEvent;
use crate::events::ClientEventKind;
use crate::events::ClientEventSink;
use crate::identity::ConnectionDescriptor;
use crate::identity::ConnectionIdentity;
use crate::identity::build_key;
use crate::response::ProcedureResponse;
use crate::settings::ClientSettings;
use crate::transport::Transport;

// ============================================================================
// SECTION: Probe Call
// ============================================================================

/// Procedure used to probe a connection.
const PROBE_PROCEDURE: &str = "@Statistics";

/// Parameters for the probe call.
fn probe_parameters() -> Vec<Value> {
    vec![json!("TABLE"), json!(0)]
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Keyed store of connections sharing one transport and event sink.
pub struct ConnectionRegistry {
    /// Collaborators handed to every connection.
    context: Arc<ClientContext>,
    /// Connections by canonical key.
    connections: Mutex<BTreeMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates a registry using the built-in procedure catalog.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: ClientSettings,
        events: Arc<dyn ClientEventSink>,
    ) -> Self {
        Self::with_catalog(transport, ProcedureCatalog::builtin(), settings, events)
    }

    /// Creates a registry with a custom procedure catalog.
    #[must_use]
    pub fn with_catalog(
        transport: Arc<dyn Transport>,
        catalog: ProcedureCatalog,
        settings: ClientSettings,
        events: Arc<dyn ClientEventSink>,
    ) -> Self {
        Self {
            context: Arc::new(ClientContext::new(transport, Arc::new(catalog), settings, events)),
            connections: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the procedure catalog.
    #[must_use]
    pub fn catalog(&self) -> &ProcedureCatalog {
        &self.context.catalog
    }

    /// Returns the client settings.
    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.context.settings
    }

    /// Opens or closes the gate that lets encoded calls reach the transport.
    pub fn set_server_connected(&self, connected: bool) {
        self.context.set_server_connected(connected);
    }

    /// Returns whether encoded calls reach the transport.
    #[must_use]
    pub fn is_server_connected(&self) -> bool {
        self.context.is_server_connected()
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Builds a connection without registering or bootstrapping it.
    #[must_use]
    pub fn open(&self, descriptor: &ConnectionDescriptor) -> Arc<Connection> {
        Arc::new(Connection::new(
            ConnectionIdentity::from_descriptor(descriptor),
            Arc::clone(&self.context),
        ))
    }

    /// Registers a connection under its key and starts bootstrap.
    ///
    /// An existing entry with the same key is replaced. `on_added` fires once
    /// bootstrap completes, with whether every metadata call succeeded.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn add(
        &self,
        descriptor: &ConnectionDescriptor,
        commands: Vec<ProcedureCommand>,
        on_added: Option<OnConnectionAdded>,
    ) -> Arc<Connection> {
        let connection = self.open(descriptor);
        self.lock().insert(connection.key().to_string(), Arc::clone(&connection));
        connection.record(&ClientEvent::new(ClientEventKind::ConnectionAdded, connection.key()));
        self.update(&connection, commands, on_added);
        connection
    }

    /// Recompiles commands and reruns bootstrap on an existing connection.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn update(
        &self,
        connection: &Arc<Connection>,
        commands: Vec<ProcedureCommand>,
        on_added: Option<OnConnectionAdded>,
    ) {
        bootstrap::compile_procedure_commands(connection, commands);
        bootstrap::load_connection_metadata(connection, on_added);
    }

    /// Looks up a connection by its exact identity tuple.
    #[must_use]
    pub fn has(
        &self,
        server: Option<&str>,
        port: Option<&str>,
        admin: bool,
        user: Option<&str>,
        process: &str,
    ) -> Option<Arc<Connection>> {
        self.get(&build_key(server, port, admin, user, process))
    }

    /// Looks up a connection by canonical key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<Connection>> {
        self.lock().get(key).cloned()
    }

    /// Removes a connection by canonical key.
    pub fn remove(&self, key: &str) -> Option<Arc<Connection>> {
        self.lock().remove(key)
    }

    /// Returns every registered connection, ordered by key.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.lock().values().cloned().collect()
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ------------------------------------------------------------------------
    // Probes
    // ------------------------------------------------------------------------

    /// Probes a descriptor with the short deadline.
    ///
    /// Returns true only for a successful server response.
    pub async fn test_connection(&self, descriptor: &ConnectionDescriptor) -> bool {
        self.probe(descriptor, self.context.settings.test_timeout).await.is_success()
    }

    /// Probes a descriptor with the long deadline.
    ///
    /// Returns true when the server produced any application response;
    /// transport failures and timeouts are false.
    pub async fn check_server_connection(&self, descriptor: &ConnectionDescriptor) -> bool {
        self.probe(descriptor, self.context.settings.check_timeout).await.is_from_server()
    }

    /// Issues the probe call through an unregistered connection.
    async fn probe(
        &self,
        descriptor: &ConnectionDescriptor,
        deadline: Duration,
    ) -> ProcedureResponse {
        self.open(descriptor)
            .execute_with_deadline(PROBE_PROCEDURE, probe_parameters(), deadline)
            .await
    }

    /// Locks the connection map.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
