// crates/dbmonitor-core/src/transport/http.rs
// ============================================================================
// Module: HTTP Transport
// Description: reqwest-backed transport for the server's JSON API.
// Purpose: POST encoded calls and decode JSON procedure responses.
// Dependencies: async-trait, reqwest, serde_json
// ============================================================================

//! ## Overview
//! [`HttpTransport`] posts form-encoded calls and decodes the JSON reply.
//! Non-success HTTP statuses resolve to a response carrying the HTTP status
//! code; connection failures and undecodable bodies resolve to
//! [`STATUS_TRANSPORT_FAILURE`].
//! Invariants:
//! - Redirects are rejected.
//! - Response bodies are capped at the configured byte limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;

use crate::response::ProcedureResponse;
use crate::response::STATUS_TRANSPORT_FAILURE;
use crate::settings::ClientSettings;
use crate::transport::Transport;
use crate::transport::TransportError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type of encoded call bodies.
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// HTTP transport for procedure calls.
///
/// # Invariants
/// - The client request timeout is the longest configured call deadline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client used for call requests.
    client: Client,
    /// Maximum accepted body size in bytes.
    max_response_bytes: usize,
}

impl HttpTransport {
    /// Builds an HTTP transport from client settings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the HTTP client cannot be constructed.
    pub fn new(settings: &ClientSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.longest_deadline())
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self {
            client,
            max_response_bytes: settings.max_response_bytes,
        })
    }

    /// Creates an HTTP transport with a preconfigured client.
    #[must_use]
    pub const fn with_client(client: Client, max_response_bytes: usize) -> Self {
        Self {
            client,
            max_response_bytes,
        }
    }

    /// Reads the body, failing once it exceeds the byte limit.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, String> {
        let max_bytes = u64::try_from(self.max_response_bytes).unwrap_or(u64::MAX);
        if let Some(length) = response.content_length()
            && length > max_bytes
        {
            return Err(format!("response exceeds size limit ({length} > {max_bytes})"));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| err.to_string())? {
            if body.len().saturating_add(chunk.len()) > self.max_response_bytes {
                return Err(format!(
                    "response exceeds size limit ({} bytes)",
                    self.max_response_bytes
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, body: &str) -> ProcedureResponse {
        let response = match self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body.to_string())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return ProcedureResponse::transport_failure(
                    STATUS_TRANSPORT_FAILURE,
                    format!("transport error: {err}"),
                );
            }
        };
        let status = response.status();
        if !status.is_success() {
            return ProcedureResponse::transport_failure(
                i64::from(status.as_u16()),
                format!("http status {status}"),
            );
        }
        let bytes = match self.read_body(response).await {
            Ok(bytes) => bytes,
            Err(message) => {
                return ProcedureResponse::transport_failure(STATUS_TRANSPORT_FAILURE, message);
            }
        };
        serde_json::from_slice::<ProcedureResponse>(&bytes).unwrap_or_else(|err| {
            ProcedureResponse::transport_failure(
                STATUS_TRANSPORT_FAILURE,
                format!("invalid response body: {err}"),
            )
        })
    }
}
