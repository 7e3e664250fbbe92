// crates/dbmonitor-core/src/bootstrap.rs
// ============================================================================
// Module: Connection Bootstrap
// Description: Two-phase metadata load that makes a connection ready.
// Purpose: Populate connection metadata through ordered queue runs.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Bootstrap compiles the caller's procedure commands onto the connection and
//! then drives two queue runs:
//! 1. Phase A runs one call per command and stores each first result table in
//!    the connection metadata.
//! 2. Phase A's completion attaches the sysproc description table and starts
//!    Phase B, an empty `continue_on_failure` run whose completion marks the
//!    connection ready and notifies the caller.
//!
//! Invariants:
//! - The connection is marked ready only from Phase B's completion handler.
//! - Metadata keys are `procedure_parameter`, with a `_process` suffix for the
//!   processes listed in [`SUFFIXED_PROCESSES`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::sysproc_descriptions;
use crate::catalog::value_text;
use crate::connection::Connection;
use crate::events::ClientEvent;
use crate::events::ClientEventKind;
use crate::queue::QueueRun;
use crate::queue::SequentialQueue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Metadata key holding the sysproc description table.
pub const SYSPROCS_METADATA_KEY: &str = "sysprocs";

/// Processes whose metadata keys carry a `_process` suffix.
pub const SUFFIXED_PROCESSES: [&str; 3] =
    ["GRAPH_MEMORY", "GRAPH_TRANSACTION", "TABLE_INFORMATION"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Callback invoked once bootstrap finishes, with the overall success flag.
pub type OnConnectionAdded = Box<dyn FnOnce(Arc<Connection>, bool) + Send + 'static>;

/// One metadata-loading call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcedureCommand {
    /// Procedure name.
    pub procedure: String,
    /// First parameter; also names the metadata entry.
    pub parameter: Value,
    /// Optional second parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ProcedureCommand {
    /// Creates a single-parameter command.
    #[must_use]
    pub fn new(procedure: impl Into<String>, parameter: impl Into<Value>) -> Self {
        Self {
            procedure: procedure.into(),
            parameter: parameter.into(),
            value: None,
        }
    }

    /// Adds the second parameter.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Returns the positional parameters for the call.
    ///
    /// Without a value, an array parameter is spread into positions.
    #[must_use]
    pub fn parameters(&self) -> Vec<Value> {
        match (&self.parameter, &self.value) {
            (parameter, Some(value)) => vec![parameter.clone(), value.clone()],
            (Value::Array(items), None) => items.clone(),
            (parameter, None) => vec![parameter.clone()],
        }
    }

    /// Returns the metadata key the response is stored under.
    ///
    /// Array parameters contribute their elements joined with `,`.
    #[must_use]
    pub fn metadata_key(&self, process: &str) -> String {
        let parameter = match &self.parameter {
            Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
            other => value_text(other),
        };
        let mut key = format!("{}_{parameter}", self.procedure);
        if SUFFIXED_PROCESSES.contains(&process) {
            key.push('_');
            key.push_str(process);
        }
        key
    }
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Replaces the connection's compiled commands.
pub(crate) fn compile_procedure_commands(connection: &Connection, commands: Vec<ProcedureCommand>) {
    connection.set_procedure_commands(commands);
}

/// Runs both bootstrap phases; readiness is observable through the connection.
pub(crate) fn load_connection_metadata(
    connection: &Arc<Connection>,
    on_added: Option<OnConnectionAdded>,
) {
    let queue = connection.queue();
    queue.start(false);
    enqueue_metadata_commands(&queue, connection, &connection.procedure_commands());

    let phase_a = Arc::clone(connection);
    let _ = queue.finalize(
        move |on_added: Option<OnConnectionAdded>, loaded| {
            phase_a.set_metadata(SYSPROCS_METADATA_KEY, sysproc_descriptions());
            start_ready_phase(&phase_a, on_added, loaded);
            Ok(())
        },
        on_added,
    );
}

/// Re-runs metadata commands through a fresh queue without touching readiness.
pub(crate) fn refresh_metadata(
    connection: &Arc<Connection>,
    commands: &[ProcedureCommand],
) -> Option<QueueRun> {
    let queue = connection.queue();
    queue.start(false);
    enqueue_metadata_commands(&queue, connection, commands);
    queue.finalize(|(), _| Ok(()), ())
}

/// Enqueues one metadata-storing call per command.
fn enqueue_metadata_commands(
    queue: &SequentialQueue,
    connection: &Arc<Connection>,
    commands: &[ProcedureCommand],
) {
    let process = connection.identity().process().to_string();
    for command in commands {
        let target = Arc::clone(connection);
        let key = command.metadata_key(&process);
        queue.enqueue(command.procedure.clone(), command.parameters(), move |response| {
            target.set_metadata(key, response.first_result());
            Ok(())
        });
    }
}

/// Phase B: an empty run whose completion marks the connection ready.
fn start_ready_phase(
    connection: &Arc<Connection>,
    on_added: Option<OnConnectionAdded>,
    loaded: bool,
) {
    let queue = connection.queue();
    queue.start(true);
    let ready = Arc::clone(connection);
    let _ = queue.finalize(
        move |on_added: Option<OnConnectionAdded>, success| {
            if ready.mark_ready() {
                ready.record(&ClientEvent::new(ClientEventKind::ConnectionReady, ready.key()));
            }
            if let Some(on_added) = on_added {
                on_added(Arc::clone(&ready), loaded && success);
            }
            Ok(())
        },
        on_added,
    );
}
