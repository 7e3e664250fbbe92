// crates/dbmonitor-config/src/config.rs
// ============================================================================
// Module: DB Monitor Configuration
// Description: Configuration loading and validation for the monitor client.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: dbmonitor-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown keys, out-of-range deadlines, duplicate connection names, and
//! bootstrap commands the procedure catalog would reject all fail the load.
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dbmonitor_core::ClientEventSink;
use dbmonitor_core::ClientSettings;
use dbmonitor_core::ConnectionDescriptor;
use dbmonitor_core::FileEventSink;
use dbmonitor_core::NoopEventSink;
use dbmonitor_core::ProcedureCatalog;
use dbmonitor_core::ProcedureCommand;
use dbmonitor_core::Scheme;
use dbmonitor_core::StderrEventSink;
use dbmonitor_core::settings::DEFAULT_API_PATH;
use dbmonitor_core::settings::DEFAULT_CALL_TIMEOUT;
use dbmonitor_core::settings::DEFAULT_CHECK_TIMEOUT;
use dbmonitor_core::settings::DEFAULT_CONNECT_TIMEOUT;
use dbmonitor_core::settings::DEFAULT_MAX_RESPONSE_BYTES;
use dbmonitor_core::settings::DEFAULT_TEST_TIMEOUT;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "dbmonitor.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "DBMONITOR_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Smallest accepted deadline in milliseconds.
pub(crate) const MIN_TIMEOUT_MS: u64 = 100;
/// Largest accepted deadline in milliseconds.
pub(crate) const MAX_TIMEOUT_MS: u64 = 600_000;
/// Maximum API path length.
pub(crate) const MAX_API_PATH_LENGTH: usize = 256;
/// Smallest accepted response body cap in bytes.
pub(crate) const MIN_RESPONSE_BYTES: usize = 1024;
/// Largest accepted response body cap in bytes.
pub(crate) const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;
/// Maximum number of named connections.
pub(crate) const MAX_CONNECTIONS: usize = 256;
/// Maximum number of bootstrap commands.
pub(crate) const MAX_BOOTSTRAP_COMMANDS: usize = 256;
/// Maximum length of a connection name.
pub(crate) const MAX_NAME_LENGTH: usize = 64;
/// Maximum length of a server host name.
pub(crate) const MAX_SERVER_LENGTH: usize = 253;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level monitor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Client deadlines and endpoint layout.
    #[serde(default)]
    pub client: ClientConfig,
    /// Event logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named connection descriptors.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    /// Metadata commands run when a connection is bootstrapped.
    #[serde(default)]
    pub bootstrap: Vec<ProcedureCommand>,
}

impl MonitorConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        self.logging.validate()?;
        if self.connections.len() > MAX_CONNECTIONS {
            return Err(ConfigError::Invalid("too many connections".to_string()));
        }
        let mut names = BTreeSet::new();
        for connection in &self.connections {
            connection.validate()?;
            if !names.insert(connection.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate connection name: {}",
                    connection.name
                )));
            }
        }
        if self.bootstrap.len() > MAX_BOOTSTRAP_COMMANDS {
            return Err(ConfigError::Invalid("too many bootstrap commands".to_string()));
        }
        let catalog = ProcedureCatalog::builtin();
        for command in &self.bootstrap {
            validate_command(&catalog, command)?;
        }
        Ok(())
    }

    /// Returns the core client settings.
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        self.client.settings()
    }

    /// Returns the named connection, if configured.
    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|connection| connection.name == name)
    }

    /// Returns the bootstrap commands.
    #[must_use]
    pub fn bootstrap_commands(&self) -> Vec<ProcedureCommand> {
        self.bootstrap.clone()
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// URL scheme selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeConfig {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

/// Client deadlines and endpoint layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Deadline for generic and queued calls.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Deadline for connection tests.
    #[serde(default = "default_test_timeout_ms")]
    pub test_timeout_ms: u64,
    /// Deadline for server reachability checks.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// API path, beginning and ending with `/`.
    #[serde(default = "default_api_path")]
    pub api_path: String,
    /// URL scheme.
    #[serde(default)]
    pub scheme: SchemeConfig,
    /// Maximum accepted response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            test_timeout_ms: default_test_timeout_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            api_path: default_api_path(),
            scheme: SchemeConfig::default(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl ClientConfig {
    /// Validates deadline and size bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("client.call_timeout_ms", self.call_timeout_ms),
            ("client.test_timeout_ms", self.test_timeout_ms),
            ("client.check_timeout_ms", self.check_timeout_ms),
            ("client.connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"
                )));
            }
        }
        if !self.api_path.starts_with('/') || !self.api_path.ends_with('/') {
            return Err(ConfigError::Invalid(
                "client.api_path must begin and end with '/'".to_string(),
            ));
        }
        if self.api_path.len() > MAX_API_PATH_LENGTH {
            return Err(ConfigError::Invalid("client.api_path exceeds max length".to_string()));
        }
        if self.api_path.chars().any(|ch| ch.is_whitespace() || ch == '?' || ch == '#') {
            return Err(ConfigError::Invalid(
                "client.api_path contains invalid characters".to_string(),
            ));
        }
        if !(MIN_RESPONSE_BYTES..=MAX_RESPONSE_BYTES).contains(&self.max_response_bytes) {
            return Err(ConfigError::Invalid(format!(
                "client.max_response_bytes must be between {MIN_RESPONSE_BYTES} and \
                 {MAX_RESPONSE_BYTES}"
            )));
        }
        Ok(())
    }

    /// Maps into core client settings.
    fn settings(&self) -> ClientSettings {
        ClientSettings {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            test_timeout: Duration::from_millis(self.test_timeout_ms),
            check_timeout: Duration::from_millis(self.check_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            scheme: match self.scheme {
                SchemeConfig::Http => Scheme::Http,
                SchemeConfig::Https => Scheme::Https,
            },
            api_path: self.api_path.clone(),
            max_response_bytes: self.max_response_bytes,
        }
    }
}

// ============================================================================
// SECTION: Logging
// ============================================================================

/// Event sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// Discard events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// Event logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path (required for the file sink).
    #[serde(default)]
    pub path: Option<String>,
}

impl LoggingConfig {
    /// Validates sink and path pairing.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (LogSinkKind::File, Some(path)) => validate_path_string("logging.path", path),
            (LogSinkKind::None | LogSinkKind::Stderr, Some(_)) => Err(ConfigError::Invalid(
                "logging.path is only valid for the file sink".to_string(),
            )),
            (LogSinkKind::None | LogSinkKind::Stderr, None) => Ok(()),
        }
    }

    /// Builds the configured event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the log file cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn ClientEventSink>, ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, Some(path)) => {
                let sink = FileEventSink::new(Path::new(path.trim()))
                    .map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("logging.path is required for the file sink".to_string()))
            }
            (LogSinkKind::Stderr, _) => Ok(Arc::new(StderrEventSink)),
            (LogSinkKind::None, _) => Ok(Arc::new(NoopEventSink)),
        }
    }
}

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Port given either as a TOML integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    /// Numeric port.
    Number(u16),
    /// Port text, used as given.
    Text(String),
}

impl PortConfig {
    /// Returns the port as text.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(port) => port.to_string(),
            Self::Text(port) => port.clone(),
        }
    }
}

/// Named connection descriptor.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Name used to select the connection.
    pub name: String,
    /// Server host name.
    #[serde(default)]
    pub server: Option<String>,
    /// Server HTTP port.
    #[serde(default)]
    pub port: Option<PortConfig>,
    /// Whether calls are issued with admin privileges.
    #[serde(default)]
    pub admin: bool,
    /// User name.
    #[serde(default)]
    pub user: Option<String>,
    /// Password or pre-hashed password.
    #[serde(default)]
    pub password: Option<String>,
    /// Whether `password` is already hashed.
    #[serde(default)]
    pub password_is_hashed: bool,
    /// Dashboard process tag.
    #[serde(default = "default_process")]
    pub process: String,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
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

impl ConnectionConfig {
    /// Validates names and host inputs.
    fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid("connections.name must be non-empty".to_string()));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(ConfigError::Invalid(format!("connection name too long: {name}")));
        }
        if let Some(server) = &self.server {
            let server = server.trim();
            if server.is_empty() || server.len() > MAX_SERVER_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "connection {name}: server must be 1..={MAX_SERVER_LENGTH} characters"
                )));
            }
            if server.contains(['/', '?', '#', '@']) || server.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "connection {name}: server must be a bare host name"
                )));
            }
        }
        if let Some(PortConfig::Text(port)) = &self.port
            && port.trim().parse::<u16>().is_err()
        {
            return Err(ConfigError::Invalid(format!("connection {name}: invalid port: {port}")));
        }
        if self.password_is_hashed && self.password.is_none() {
            return Err(ConfigError::Invalid(format!(
                "connection {name}: password_is_hashed requires password"
            )));
        }
        Ok(())
    }

    /// Builds the core connection descriptor.
    #[must_use]
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            server: self.server.clone(),
            port: self.port.as_ref().map(PortConfig::as_text),
            admin: self.admin,
            user: self.user.clone(),
            password: self.password.clone(),
            password_is_hashed: self.password_is_hashed,
            process: self.process.clone(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Checks that a bootstrap command names a known procedure and arity.
fn validate_command(
    catalog: &ProcedureCatalog,
    command: &ProcedureCommand,
) -> Result<(), ConfigError> {
    let arity = command.parameters().len();
    let Some(arities) = catalog.arities(&command.procedure) else {
        return Err(ConfigError::Invalid(format!(
            "bootstrap procedure is undefined: {}",
            command.procedure
        )));
    };
    if !arities.contains(&arity) {
        return Err(ConfigError::Invalid(format!(
            "bootstrap procedure {} does not accept {arity} parameters",
            command.procedure
        )));
    }
    Ok(())
}

/// Converts a core default deadline into config milliseconds.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Default generic call deadline.
fn default_call_timeout_ms() -> u64 {
    duration_ms(DEFAULT_CALL_TIMEOUT)
}

/// Default connection test deadline.
fn default_test_timeout_ms() -> u64 {
    duration_ms(DEFAULT_TEST_TIMEOUT)
}

/// Default server check deadline.
fn default_check_timeout_ms() -> u64 {
    duration_ms(DEFAULT_CHECK_TIMEOUT)
}

/// Default TCP connect timeout.
fn default_connect_timeout_ms() -> u64 {
    duration_ms(DEFAULT_CONNECT_TIMEOUT)
}

/// Default API path.
fn default_api_path() -> String {
    DEFAULT_API_PATH.to_string()
}

/// Default response body cap.
const fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

/// Default dashboard process tag.
fn default_process() -> String {
    "DASHBOARD".to_string()
}
