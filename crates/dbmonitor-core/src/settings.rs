// crates/dbmonitor-core/src/settings.rs
// ============================================================================
// Module: Client Settings
// Description: Deadlines and endpoint layout used by the client.
// Purpose: Carry validated runtime settings into connections and transports.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`ClientSettings`] holds per-call deadlines and endpoint layout. Defaults
//! match the dashboard: 20s for generic calls, 5s for connection tests, and
//! 60s for server reachability checks.

use std::time::Duration;

/// Default deadline for generic procedure calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);
/// Default deadline for connection tests.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for server reachability checks.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(60);
/// Default TCP connect timeout for the HTTP transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default API path appended to `scheme://server:port`.
pub const DEFAULT_API_PATH: &str = "/api/1.0/";
/// Default cap on response body size.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// URL scheme used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Returns the scheme label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Runtime settings shared by every connection of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Deadline for generic and queued calls.
    pub call_timeout: Duration,
    /// Deadline for connection tests.
    pub test_timeout: Duration,
    /// Deadline for server reachability checks.
    pub check_timeout: Duration,
    /// TCP connect timeout for the HTTP transport.
    pub connect_timeout: Duration,
    /// URL scheme.
    pub scheme: Scheme,
    /// API path, beginning and ending with `/`.
    pub api_path: String,
    /// Maximum accepted response body size in bytes.
    pub max_response_bytes: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scheme: Scheme::Http,
            api_path: DEFAULT_API_PATH.to_string(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl ClientSettings {
    /// Returns the longest configured deadline.
    ///
    /// Used to bound abandoned transport requests.
    #[must_use]
    pub fn longest_deadline(&self) -> Duration {
        self.call_timeout.max(self.test_timeout).max(self.check_timeout)
    }
}
