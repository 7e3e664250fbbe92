// crates/dbmonitor-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared helpers for dbmonitor-core tests.
// Purpose: Provide a scripted transport, a recording event sink, and builders.
// Dependencies: dbmonitor-core, serde_json, tokio, url
// ============================================================================

//! ## Overview
//! [`ScriptedTransport`] answers calls from per-procedure scripts, optionally
//! after a delay, and records every call it receives together with the peak
//! number of concurrently outstanding sends.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use dbmonitor_core::ClientEvent;
use dbmonitor_core::ClientEventKind;
use dbmonitor_core::ClientEventSink;
use dbmonitor_core::ClientSettings;
use dbmonitor_core::ConnectionDescriptor;
use dbmonitor_core::ConnectionRegistry;
use dbmonitor_core::ProcedureResponse;
use dbmonitor_core::Transport;
use serde_json::Value;
use serde_json::json;
use url::form_urlencoded;

// ============================================================================
// SECTION: Scripted Transport
// ============================================================================

/// One call observed by the scripted transport.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Endpoint the call was sent to.
    pub endpoint: String,
    /// Decoded form fields.
    pub fields: BTreeMap<String, String>,
}

impl RecordedCall {
    /// Returns the `Procedure` form field.
    pub fn procedure(&self) -> &str {
        self.fields.get("Procedure").map_or("", String::as_str)
    }

    /// Returns the `Parameters` form field.
    pub fn parameters(&self) -> &str {
        self.fields.get("Parameters").map_or("", String::as_str)
    }
}

/// Per-procedure script.
#[derive(Default)]
struct Script {
    /// Responses in order; the last one repeats.
    responses: VecDeque<ProcedureResponse>,
    /// Delay applied before answering.
    delay: Duration,
}

/// In-memory transport answering from scripts.
#[derive(Default)]
pub struct ScriptedTransport {
    /// Scripts by procedure name.
    scripts: Mutex<BTreeMap<String, Script>>,
    /// Calls in arrival order.
    calls: Mutex<Vec<RecordedCall>>,
    /// Sends currently outstanding.
    in_flight: AtomicUsize,
    /// Peak of `in_flight`.
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Creates a transport that answers every call with an empty success.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends a scripted response for `procedure`.
    pub fn respond(&self, procedure: &str, response: ProcedureResponse) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(procedure.to_string())
            .or_default()
            .responses
            .push_back(response);
        self
    }

    /// Delays every answer for `procedure`.
    pub fn delay(&self, procedure: &str, delay: Duration) -> &Self {
        self.scripts.lock().unwrap().entry(procedure.to_string()).or_default().delay = delay;
        self
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns the procedure names received so far, in order.
    pub fn procedures(&self) -> Vec<String> {
        self.calls().iter().map(|call| call.procedure().to_string()).collect()
    }

    /// Returns the peak number of concurrently outstanding sends.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Pops the next scripted answer for `procedure`.
    fn next(&self, procedure: &str) -> (ProcedureResponse, Duration) {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(procedure) else {
            return (ProcedureResponse::success(Vec::new()), Duration::ZERO);
        };
        let response = if script.responses.len() > 1 {
            script.responses.pop_front()
        } else {
            script.responses.front().cloned()
        };
        (response.unwrap_or_else(|| ProcedureResponse::success(Vec::new())), script.delay)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, endpoint: &str, body: &str) -> ProcedureResponse {
        let fields: BTreeMap<String, String> =
            form_urlencoded::parse(body.as_bytes()).into_owned().collect();
        let procedure = fields.get("Procedure").cloned().unwrap_or_default();
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: endpoint.to_string(),
            fields,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let (response, delay) = self.next(&procedure);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

// ============================================================================
// SECTION: Event Sink
// ============================================================================

/// Sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingEventSink {
    /// Recorded events.
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns every recorded event.
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns the recorded event kinds in order.
    pub fn kinds(&self) -> Vec<ClientEventKind> {
        self.events().iter().map(|event| event.event).collect()
    }
}

impl ClientEventSink for RecordingEventSink {
    fn record(&self, event: &ClientEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds a registry backed by the scripted transport and a recording sink.
pub fn registry(
    transport: &Arc<ScriptedTransport>,
) -> (ConnectionRegistry, Arc<RecordingEventSink>) {
    registry_with_settings(transport, ClientSettings::default())
}

/// Builds a registry with explicit settings.
pub fn registry_with_settings(
    transport: &Arc<ScriptedTransport>,
    settings: ClientSettings,
) -> (ConnectionRegistry, Arc<RecordingEventSink>) {
    let events = RecordingEventSink::new();
    let registry = ConnectionRegistry::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        settings,
        Arc::clone(&events) as Arc<dyn ClientEventSink>,
    );
    (registry, events)
}

/// Descriptor for a local, unauthenticated connection.
pub fn local_descriptor(process: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::new("localhost", "8080", process)
}

/// A single-row result table.
pub fn table(rows: &[Value]) -> Value {
    json!({ "schema": [], "data": rows })
}

/// A failed server response.
pub fn server_failure(status: i64, message: &str) -> ProcedureResponse {
    ProcedureResponse::new(status, message, Vec::new())
}
