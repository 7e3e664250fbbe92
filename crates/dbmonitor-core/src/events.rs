// crates/dbmonitor-core/src/events.rs
// ============================================================================
// Module: Client Events
// Description: Structured event records for call and connection lifecycle.
// Purpose: Emit JSON-line logs without hard dependencies on a log pipeline.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The client reports timeouts, encoding failures, callback and completion
//! handler failures, and connection lifecycle transitions as [`ClientEvent`]
//! records through a [`ClientEventSink`]. Sinks are lightweight so
//! deployments can route events to their preferred logging pipeline.
//! Credentials are never part of an event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event classification.
///
/// # Invariants
/// - Variants are stable for log consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEventKind {
    /// A call could not be encoded and was failed locally.
    EncodingError,
    /// A call deadline elapsed before the response arrived.
    CallTimeout,
    /// A queued item callback reported an error.
    CallbackError,
    /// A queue completion handler reported an error.
    CompletionHandlerError,
    /// A connection was stored in the registry.
    ConnectionAdded,
    /// A connection finished bootstrap and became ready.
    ConnectionReady,
}

impl ClientEventKind {
    /// Returns a stable label for the event kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EncodingError => "encoding_error",
            Self::CallTimeout => "call_timeout",
            Self::CallbackError => "callback_error",
            Self::CompletionHandlerError => "completion_handler_error",
            Self::ConnectionAdded => "connection_added",
            Self::ConnectionReady => "connection_ready",
        }
    }
}

/// Client event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ClientEvent {
    /// Event identifier.
    pub event: ClientEventKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Connection key the event belongs to.
    pub connection: String,
    /// Procedure name when the event concerns a call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    /// Response status when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClientEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(event: ClientEventKind, connection: impl Into<String>) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            connection: connection.into(),
            procedure: None,
            status: None,
            message: None,
        }
    }

    /// Attaches the procedure name.
    #[must_use]
    pub fn with_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = Some(procedure.into());
        self
    }

    /// Attaches the response status.
    #[must_use]
    pub const fn with_status(mut self, status: i64) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for client events.
pub trait ClientEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &ClientEvent);
}

/// Sink that discards every event.
pub struct NoopEventSink;

impl ClientEventSink for NoopEventSink {
    fn record(&self, _event: &ClientEvent) {}
}

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl ClientEventSink for StderrEventSink {
    fn record(&self, event: &ClientEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that logs JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl ClientEventSink for FileEventSink {
    fn record(&self, event: &ClientEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}
