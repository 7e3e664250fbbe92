// crates/dbmonitor-core/src/response.rs
// ============================================================================
// Module: Procedure Responses
// Description: Response envelope returned by every procedure call.
// Purpose: Model server, transport, and client-synthesized call outcomes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every procedure call resolves to a [`ProcedureResponse`], whether the value
//! came from the server, from a failed transport, or was synthesized locally
//! for a timeout or an encoding failure. A `status` of
//! [`STATUS_SUCCESS`] is the only success value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::EncodingError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Application status reported by the server for a successful call.
pub const STATUS_SUCCESS: i64 = 1;
/// Status used for client-synthesized failures (timeouts, encoding errors).
pub const STATUS_CLIENT_FAILURE: i64 = -1;
/// Status used when the transport could not reach the server or decode a reply.
pub const STATUS_TRANSPORT_FAILURE: i64 = 0;
/// Status string carried by synthesized timeout responses.
pub const TIMEOUT_STATUS_STRING: &str = "Query timeout.";
/// Prefix carried by synthesized encoding-failure responses.
pub const PREPARE_ERROR_PREFIX: &str = "PrepareStatement error: ";

// ============================================================================
// SECTION: Response Types
// ============================================================================

/// Where a response value originated.
///
/// # Invariants
/// - Decoded server bodies are always [`ResponseOrigin::Server`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseOrigin {
    /// Decoded from a server reply.
    #[default]
    Server,
    /// Produced by the transport after a network or HTTP-level failure.
    Transport,
    /// Synthesized locally (deadline elapsed or call could not be encoded).
    Client,
}

/// Result of a single procedure call.
///
/// # Invariants
/// - `status == STATUS_SUCCESS` denotes success; any other value is a failure.
/// - `origin` is not part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureResponse {
    /// Application status code.
    #[serde(default)]
    pub status: i64,
    /// Human-readable status message (empty when the server sent none).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub statusstring: String,
    /// Result tables returned by the procedure.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<Value>,
    /// Origin of this response.
    #[serde(skip)]
    pub origin: ResponseOrigin,
}

impl ProcedureResponse {
    /// Builds a server-origin response.
    #[must_use]
    pub fn new(status: i64, statusstring: impl Into<String>, results: Vec<Value>) -> Self {
        Self {
            status,
            statusstring: statusstring.into(),
            results,
            origin: ResponseOrigin::Server,
        }
    }

    /// Builds a successful server-origin response with the provided result rows.
    #[must_use]
    pub fn success(results: Vec<Value>) -> Self {
        Self::new(STATUS_SUCCESS, "", results)
    }

    /// Builds a transport failure carrying a best-effort status.
    #[must_use]
    pub fn transport_failure(status: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            statusstring: message.into(),
            results: Vec::new(),
            origin: ResponseOrigin::Transport,
        }
    }

    /// Builds the synthetic response delivered when a deadline elapses.
    #[must_use]
    pub fn timeout() -> Self {
        Self {
            status: STATUS_CLIENT_FAILURE,
            statusstring: TIMEOUT_STATUS_STRING.to_string(),
            results: Vec::new(),
            origin: ResponseOrigin::Client,
        }
    }

    /// Builds the synthetic response delivered when a call cannot be encoded.
    #[must_use]
    pub fn prepare_error(error: &EncodingError) -> Self {
        Self {
            status: STATUS_CLIENT_FAILURE,
            statusstring: format!("{PREPARE_ERROR_PREFIX}{error}"),
            results: Vec::new(),
            origin: ResponseOrigin::Client,
        }
    }

    /// Returns true when the application status denotes success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Returns true when this is the synthesized deadline response.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.origin == ResponseOrigin::Client && self.statusstring == TIMEOUT_STATUS_STRING
    }

    /// Returns true when the response was produced by the server itself.
    #[must_use]
    pub fn is_from_server(&self) -> bool {
        self.origin == ResponseOrigin::Server
    }

    /// Returns the first result table, or `null` when there is none.
    #[must_use]
    pub fn first_result(&self) -> Value {
        self.results.first().cloned().unwrap_or(Value::Null)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Deserializes an explicit `null` as the type's default value.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
