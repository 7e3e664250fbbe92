// crates/dbmonitor-core/src/identity.rs
// ============================================================================
// Module: Connection Identity
// Description: Descriptor normalization, dedup keys, and display labels.
// Purpose: Give every logical connection one canonical identity.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ConnectionDescriptor`] is the raw, externally supplied endpoint and
//! credential input. [`ConnectionIdentity`] is its normalized form: defaults
//! applied, placeholder values dropped, and a canonical [`build_key`] derived
//! so that two logically identical descriptors always produce the same key.
//! Invariants:
//! - Keys contain only `[A-Za-z0-9_]`.
//! - A password and a hashed password are never both present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::settings::ClientSettings;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Server used when the descriptor omits one.
pub const DEFAULT_SERVER: &str = "localhost";
/// Port used when the descriptor omits one.
pub const DEFAULT_PORT: &str = "8080";
/// Placeholder text treated as an absent value.
const NULL_PLACEHOLDER: &str = "null";

// ============================================================================
// SECTION: Descriptor
// ============================================================================

/// Raw connection inputs as supplied by the caller.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Server host name; defaults to `localhost`.
    #[serde(default)]
    pub server: Option<String>,
    /// Server HTTP port; defaults to `8080`.
    #[serde(default)]
    pub port: Option<String>,
    /// Whether calls are issued with admin privileges.
    #[serde(default)]
    pub admin: bool,
    /// User name, if authentication is enabled.
    #[serde(default)]
    pub user: Option<String>,
    /// Password or pre-hashed password, depending on `password_is_hashed`.
    #[serde(default)]
    pub password: Option<String>,
    /// Whether `password` already holds a hashed password.
    #[serde(default)]
    pub password_is_hashed: bool,
    /// Dashboard process tag that owns the connection.
    #[serde(default)]
    pub process: String,
}

impl ConnectionDescriptor {
    /// Creates a descriptor for the given server, port, and process tag.
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        port: impl Into<String>,
        process: impl Into<String>,
    ) -> Self {
        Self {
            server: Some(server.into()),
            port: Some(port.into()),
            process: process.into(),
            ..Self::default()
        }
    }

    /// Sets the user name.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets a clear-text password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self.password_is_hashed = false;
        self
    }

    /// Sets a pre-hashed password.
    #[must_use]
    pub fn with_hashed_password(mut self, hashed: impl Into<String>) -> Self {
        self.password = Some(hashed.into());
        self.password_is_hashed = true;
        self
    }

    /// Marks the connection as an admin connection.
    #[must_use]
    pub const fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("admin", &self.admin)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_is_hashed", &self.password_is_hashed)
            .field("process", &self.process)
            .finish()
    }
}

// ============================================================================
// SECTION: Credential
// ============================================================================

/// Secret sent with each call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Clear-text password.
    Password(String),
    /// Pre-hashed password.
    HashedPassword(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::HashedPassword(_) => f.write_str("HashedPassword(<redacted>)"),
        }
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Normalized connection identity.
///
/// # Invariants
/// - `key` is derived with [`build_key`] from the other fields.
/// - `display` is derived with [`build_display`] from the other fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    /// Trimmed server host.
    server: String,
    /// Trimmed server port.
    port: String,
    /// Admin flag.
    admin: bool,
    /// User name, absent when empty or the `null` placeholder.
    user: Option<String>,
    /// Password or hashed password.
    credential: Option<Credential>,
    /// Dashboard process tag.
    process: String,
    /// Canonical dedup key.
    key: String,
    /// Human-readable label.
    display: String,
}

impl ConnectionIdentity {
    /// Normalizes a descriptor into an identity.
    #[must_use]
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        let server = normalize_server(descriptor.server.as_deref());
        let port = normalize_port(descriptor.port.as_deref());
        let user = present(descriptor.user.as_deref());
        let credential = present(descriptor.password.as_deref()).map(|secret| {
            if descriptor.password_is_hashed {
                Credential::HashedPassword(secret)
            } else {
                Credential::Password(secret)
            }
        });
        let key = build_key(
            Some(&server),
            Some(&port),
            descriptor.admin,
            user.as_deref(),
            &descriptor.process,
        );
        let display = build_display(&server, &port, user.as_deref(), descriptor.admin);
        Self {
            server,
            port,
            admin: descriptor.admin,
            user,
            credential,
            process: descriptor.process.clone(),
            key,
            display,
        }
    }

    /// Returns the server host.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the server port.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns whether calls are issued as admin.
    #[must_use]
    pub const fn admin(&self) -> bool {
        self.admin
    }

    /// Returns the user name, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the credential, if any.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns the process tag.
    #[must_use]
    pub fn process(&self) -> &str {
        &self.process
    }

    /// Returns the canonical dedup key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the display label.
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Returns the procedure endpoint URL for this identity.
    #[must_use]
    pub fn endpoint(&self, settings: &ClientSettings) -> String {
        format!(
            "{}://{}:{}{}",
            settings.scheme.as_str(),
            self.server,
            self.port,
            settings.api_path
        )
    }
}

// ============================================================================
// SECTION: Key Derivation
// ============================================================================

/// Builds the canonical dedup key for a connection tuple.
///
/// Applies the same defaults as [`ConnectionIdentity::from_descriptor`], so
/// lookups and registrations always agree.
#[must_use]
pub fn build_key(
    server: Option<&str>,
    port: Option<&str>,
    admin: bool,
    user: Option<&str>,
    process: &str,
) -> String {
    let server = normalize_server(server);
    let port = normalize_port(port);
    let user = present(user).unwrap_or_default();
    let admin = if admin { "Admin" } else { "" };
    format!("{server}_{port}_{user}_{admin}_{process}")
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

/// Builds the human-readable label `server:port (user) - Admin`.
#[must_use]
pub fn build_display(server: &str, port: &str, user: Option<&str>, admin: bool) -> String {
    let mut display = format!("{server}:{port}");
    if let Some(user) = user.filter(|user| !user.is_empty()) {
        display.push_str(" (");
        display.push_str(user);
        display.push(')');
    }
    if admin {
        display.push_str(" - Admin");
    }
    display
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Trims the server or falls back to the default.
fn normalize_server(server: Option<&str>) -> String {
    server.map_or_else(|| DEFAULT_SERVER.to_string(), |server| server.trim().to_string())
}

/// Trims the port or falls back to the default.
fn normalize_port(port: Option<&str>) -> String {
    port.map_or_else(|| DEFAULT_PORT.to_string(), |port| port.trim().to_string())
}

/// Drops empty strings and the `null` placeholder.
fn present(value: Option<&str>) -> Option<String> {
    value.filter(|value| !value.is_empty() && *value != NULL_PLACEHOLDER).map(str::to_string)
}
