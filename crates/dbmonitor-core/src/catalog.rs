// crates/dbmonitor-core/src/catalog.rs
// ============================================================================
// Module: Procedure Catalog
// Description: Procedure signatures and call encoding.
// Purpose: Validate procedure arity and render transport-ready parameters.
// Dependencies: serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! The [`ProcedureCatalog`] maps a procedure name and argument count to the
//! ordered [`TypeTag`] list expected by the server. [`ProcedureCatalog::encode`]
//! validates a call against that table and renders a form-encoded request body.
//! Encoding failures are returned as [`EncodingError`] values before any
//! network interaction takes place.
//! Invariants:
//! - The catalog is immutable once built.
//! - Credential fields are appended only when present on the identity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use url::form_urlencoded;

use crate::identity::ConnectionIdentity;
use crate::identity::Credential;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Snapshot deletion procedure whose string parameters are sent as arrays.
pub const SNAPSHOT_DELETE: &str = "@SnapshotDelete";

/// Built-in procedure table: name followed by one type-tag list per arity.
const BUILTIN_PROCEDURES: &[(&str, &[&[&str]])] = &[
    ("@AdHoc", &[&["varchar"]]),
    ("@Explain", &[&["varchar"]]),
    ("@ExplainProc", &[&["varchar"]]),
    ("@Pause", &[&[]]),
    ("@Promote", &[&[]]),
    ("@Quiesce", &[&[]]),
    ("@Resume", &[&[]]),
    ("@Shutdown", &[&[]]),
    (SNAPSHOT_DELETE, &[&["varchar", "varchar"]]),
    ("@SnapshotRestore", &[&["varchar"], &["varchar", "varchar"]]),
    ("@SnapshotSave", &[&["varchar", "varchar", "bit"], &["varchar"]]),
    ("@SnapshotScan", &[&["varchar"]]),
    ("@SnapshotStatus", &[&[]]),
    ("@Statistics", &[&["StatisticsComponent", "bit"]]),
    ("@SystemCatalog", &[&["CatalogComponent"]]),
    ("@SystemInformation", &[&["SysInfoSelector"]]),
    ("@UpdateApplicationCatalog", &[&["varchar", "varchar"]]),
    ("@UpdateLogging", &[&["xml"]]),
    ("@ValidatePartitioning", &[&["int", "varbinary"]]),
    ("@GetPartitionKeys", &[&["varchar"]]),
    ("@GC", &[&[]]),
    ("@StopNode", &[&["int"]]),
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons a procedure call cannot be encoded.
///
/// # Invariants
/// - Messages name the procedure; arity errors list every accepted count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The procedure is not present in the catalog.
    #[error("Procedure \"{procedure}\" is undefined.")]
    UnknownProcedure {
        /// Requested procedure name.
        procedure: String,
    },
    /// No signature matches the supplied parameter count.
    #[error(
        "Invalid parameter count for procedure \"{procedure}\" \
         (received: {received}, expected: {accepted})",
        accepted = join_arities(.expected)
    )]
    InvalidParameterCount {
        /// Requested procedure name.
        procedure: String,
        /// Number of parameters supplied.
        received: usize,
        /// Every arity the catalog accepts for the procedure.
        expected: Vec<usize>,
    },
}

// ============================================================================
// SECTION: Type Tags
// ============================================================================

/// Declared type of a single procedure parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    /// 8-bit integer.
    TinyInt,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer (`int`).
    Int,
    /// 32-bit integer (`integer`).
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Floating point value.
    Float,
    /// Decimal value, sent quoted.
    Decimal,
    /// Boolean flag, sent as `0` or `1`.
    Bit,
    /// Binary payload, sent verbatim.
    VarBinary,
    /// Any other tag; rendered as a quoted string. Keeps the declared tag name.
    Text(String),
}

impl TypeTag {
    /// Parses a declared tag name; unknown names become [`TypeTag::Text`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tinyint" => Self::TinyInt,
            "smallint" => Self::SmallInt,
            "int" => Self::Int,
            "integer" => Self::Integer,
            "bigint" => Self::BigInt,
            "float" => Self::Float,
            "decimal" => Self::Decimal,
            "bit" => Self::Bit,
            "varbinary" => Self::VarBinary,
            other => Self::Text(other.to_string()),
        }
    }

    /// Returns the declared tag name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Bit => "bit",
            Self::VarBinary => "varbinary",
            Self::Text(name) => name,
        }
    }
}

// ============================================================================
// SECTION: Encoded Call
// ============================================================================

/// A validated, transport-ready procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    /// Procedure name.
    pub procedure: String,
    /// Rendered positional parameter array (before form encoding).
    pub parameters: String,
    /// Form-encoded request body including credential fields.
    pub body: String,
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Builder for custom procedure catalogs.
///
/// # Invariants
/// - Registering the same (name, arity) twice keeps the last signature.
#[derive(Debug, Default)]
pub struct ProcedureCatalogBuilder {
    /// Signatures keyed by procedure name, then arity.
    procedures: BTreeMap<String, BTreeMap<usize, Vec<TypeTag>>>,
}

impl ProcedureCatalogBuilder {
    /// Registers one signature; its arity is the number of tags.
    #[must_use]
    pub fn signature<I, S>(mut self, procedure: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<TypeTag> = tags.into_iter().map(|tag| TypeTag::parse(tag.as_ref())).collect();
        self.procedures.entry(procedure.into()).or_default().insert(tags.len(), tags);
        self
    }

    /// Builds the immutable catalog.
    #[must_use]
    pub fn build(self) -> ProcedureCatalog {
        ProcedureCatalog {
            procedures: self.procedures,
        }
    }
}

/// Immutable mapping from procedure name and arity to parameter types.
#[derive(Debug, Clone)]
pub struct ProcedureCatalog {
    /// Signatures keyed by procedure name, then arity.
    procedures: BTreeMap<String, BTreeMap<usize, Vec<TypeTag>>>,
}

impl Default for ProcedureCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProcedureCatalog {
    /// Returns a builder for a custom catalog.
    #[must_use]
    pub fn builder() -> ProcedureCatalogBuilder {
        ProcedureCatalogBuilder::default()
    }

    /// Returns the built-in system procedure catalog.
    #[must_use]
    pub fn builtin() -> Self {
        BUILTIN_PROCEDURES
            .iter()
            .fold(Self::builder(), |builder, (name, signatures)| {
                signatures
                    .iter()
                    .fold(builder, |builder, tags| builder.signature(*name, tags.iter().copied()))
            })
            .build()
    }

    /// Returns the registered procedure names in sorted order.
    pub fn procedure_names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    /// Returns the accepted arities for a procedure, or `None` if unknown.
    #[must_use]
    pub fn arities(&self, procedure: &str) -> Option<Vec<usize>> {
        self.procedures.get(procedure).map(|signatures| signatures.keys().copied().collect())
    }

    /// Returns the signature for a (procedure, arity) pair.
    #[must_use]
    pub fn signature(&self, procedure: &str, arity: usize) -> Option<&[TypeTag]> {
        self.procedures.get(procedure)?.get(&arity).map(Vec::as_slice)
    }

    /// Validates and encodes a call for the given connection identity.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError`] when the procedure is unknown or no signature
    /// matches the parameter count.
    pub fn encode(
        &self,
        procedure: &str,
        parameters: &[Value],
        identity: &ConnectionIdentity,
    ) -> Result<EncodedCall, EncodingError> {
        let signatures =
            self.procedures.get(procedure).ok_or_else(|| EncodingError::UnknownProcedure {
                procedure: procedure.to_string(),
            })?;
        let signature = signatures.get(&parameters.len()).ok_or_else(|| {
            EncodingError::InvalidParameterCount {
                procedure: procedure.to_string(),
                received: parameters.len(),
                expected: signatures.keys().copied().collect(),
            }
        })?;
        let rendered = render_parameters(procedure, signature, parameters);

        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("Procedure", procedure);
        form.append_pair("Parameters", &rendered);
        if let Some(user) = identity.user() {
            form.append_pair("User", user);
        }
        match identity.credential() {
            Some(Credential::Password(password)) => {
                form.append_pair("Password", password);
            }
            Some(Credential::HashedPassword(hashed)) => {
                form.append_pair("Hashedpassword", hashed);
            }
            None => {}
        }
        if identity.admin() {
            form.append_pair("admin", "true");
        }
        Ok(EncodedCall {
            procedure: procedure.to_string(),
            parameters: rendered,
            body: form.finish(),
        })
    }
}

// ============================================================================
// SECTION: Sysproc Descriptions
// ============================================================================

/// Returns the human-readable system procedure description table.
///
/// Each procedure maps arity to parameter labels followed by the return type.
#[must_use]
pub fn sysproc_descriptions() -> Value {
    json!({
        "@Explain": { "1": ["SQL (varchar)", "Returns Table[]"] },
        "@ExplainProc": { "1": ["Stored Procedure Name (varchar)", "Returns Table[]"] },
        "@Pause": { "0": ["Returns bit"] },
        "@Quiesce": { "0": ["Returns bit"] },
        "@Resume": { "0": ["Returns bit"] },
        "@Shutdown": { "0": ["Returns bit"] },
        "@SnapshotDelete": {
            "2": ["DirectoryPath (varchar)", "UniqueId (varchar)", "Returns Table[]"]
        },
        "@SnapshotRestore": {
            "2": ["DirectoryPath (varchar)", "UniqueId (varchar)", "Returns Table[]"],
            "1": ["JSON (varchar)", "Returns Table[]"]
        },
        "@SnapshotSave": {
            "3": [
                "DirectoryPath (varchar)",
                "UniqueId (varchar)",
                "Blocking (bit)",
                "Returns Table[]"
            ],
            "1": ["JSON (varchar)", "Returns Table[]"]
        },
        "@SnapshotScan": { "1": ["DirectoryPath (varchar)", "Returns Table[]"] },
        "@SnapshotStatus": { "0": ["Returns Table[]"] },
        "@Statistics": {
            "2": ["Statistic (StatisticsComponent)", "Interval (bit)", "Returns Table[]"]
        },
        "@SystemCatalog": { "1": ["SystemCatalog (CatalogComponent)", "Returns Table[]"] },
        "@SystemInformation": { "1": ["Selector (SysInfoSelector)", "Returns Table[]"] },
        "@UpdateApplicationCatalog": {
            "2": ["CatalogPath (varchar)", "DeploymentConfigPath (varchar)", "Returns Table[]"]
        },
        "@UpdateLogging": { "1": ["Configuration (xml)", "Returns Table[]"] },
        "@Promote": { "0": ["Returns bit"] },
        "@ValidatePartitioning": {
            "2": ["HashinatorType (int)", "Config (varbinary)", "Returns Table[]"]
        },
        "@GetPartitionKeys": { "1": ["VoltType (varchar)", "Returns Table[]"] }
    })
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the positional parameter array for a matched signature.
fn render_parameters(procedure: &str, signature: &[TypeTag], parameters: &[Value]) -> String {
    let rendered: Vec<String> = signature
        .iter()
        .zip(parameters)
        .map(|(tag, value)| render_parameter(procedure, tag, value))
        .collect();
    format!("[{}]", rendered.join(","))
}

/// Renders a single parameter according to its declared type.
fn render_parameter(procedure: &str, tag: &TypeTag, value: &Value) -> String {
    match tag {
        TypeTag::TinyInt
        | TypeTag::SmallInt
        | TypeTag::Int
        | TypeTag::Integer
        | TypeTag::BigInt
        | TypeTag::Float
        | TypeTag::VarBinary => value_text(value),
        TypeTag::Decimal => format!("\"{}\"", value_text(value)),
        TypeTag::Bit => String::from(if is_truthy_bit(value) { "1" } else { "0" }),
        TypeTag::Text(_) if procedure == SNAPSHOT_DELETE => {
            format!("[\"{}\"]", strip_single_quotes(&value_text(value)))
        }
        TypeTag::Text(_) => match value {
            Value::String(text) => format!("\"{}\"", strip_single_quotes(text)).replace("''", "'"),
            other => value_text(other),
        },
    }
}

/// Returns the bare text of a value: strings unquoted, everything else as JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Returns true for the accepted truthy spellings of a bit parameter.
pub(crate) fn is_truthy_bit(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => {
            number.as_i64() == Some(1)
                || number.as_f64().is_some_and(|float| (float - 1.0).abs() < f64::EPSILON)
        }
        Value::String(text) => matches!(text.as_str(), "true" | "'true'" | "yes" | "'yes'" | "1"),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Strips one leading and one trailing single quote.
pub(crate) fn strip_single_quotes(text: &str) -> &str {
    let text = text.strip_prefix('\'').unwrap_or(text);
    text.strip_suffix('\'').unwrap_or(text)
}

/// Formats accepted arities for error messages.
fn join_arities(arities: &[usize]) -> String {
    arities.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")
}
