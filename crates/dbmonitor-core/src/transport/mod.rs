// crates/dbmonitor-core/src/transport/mod.rs
// ============================================================================
// Module: Procedure Transports
// Description: Request/response primitive used to reach the server.
// Purpose: Decouple call orchestration from the network client.
// Dependencies: async-trait, thiserror
// ============================================================================

//! ## Overview
//! A [`Transport`] sends one encoded call to an endpoint and resolves to a
//! [`ProcedureResponse`]. Transports never return errors: network and HTTP
//! failures resolve to a response with a best-effort status and
//! [`crate::ResponseOrigin::Transport`] origin.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;

use crate::response::ProcedureResponse;

// ============================================================================
// SECTION: Transport Trait
// ============================================================================

/// Sends encoded procedure calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the form-encoded `body` to `endpoint` and resolves with the reply.
    async fn send(&self, endpoint: &str, body: &str) -> ProcedureResponse;
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while constructing a transport.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be built.
    #[error("http client construction failed: {0}")]
    Client(String),
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

pub mod http;

pub use http::HttpTransport;
