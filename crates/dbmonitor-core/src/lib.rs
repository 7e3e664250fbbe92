// crates/dbmonitor-core/src/lib.rs
// ============================================================================
// Module: DB Monitor Core Library
// Description: Procedure-call orchestration for the database monitor client.
// Purpose: Encode, guard, serialize, and bootstrap remote procedure calls.
// Dependencies: async-trait, reqwest, serde, serde_json, thiserror, tokio, url
// ============================================================================

//! ## Overview
//! `dbmonitor-core` issues administrative and statistics procedure calls
//! against a clustered database over a request/response [`Transport`]. Calls are
//! validated and encoded by the [`ProcedureCatalog`], resolved exactly once by
//! a [`GuardedCallback`] deadline, ordered by a [`SequentialQueue`], and used by
//! the bootstrap protocol to populate [`Connection`] metadata before a
//! connection is marked ready. Connections are deduplicated by the
//! [`ConnectionRegistry`].
//! Invariants:
//! - A queue never has more than one call in flight.
//! - Every guarded callback fires at most once.
//! - A connection becomes ready exactly once, after both bootstrap phases.
//!
//! Security posture: server responses and descriptor inputs are untrusted;
//! credentials are never written to event records.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod catalog;
pub mod connection;
pub(crate) mod context;
pub mod events;
pub mod identity;
pub mod invocation;
pub mod queue;
pub mod registry;
pub mod response;
pub mod settings;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::OnConnectionAdded;
pub use bootstrap::ProcedureCommand;
pub use bootstrap::SYSPROCS_METADATA_KEY;
pub use catalog::EncodedCall;
pub use catalog::EncodingError;
pub use catalog::ProcedureCatalog;
pub use catalog::ProcedureCatalogBuilder;
pub use catalog::TypeTag;
pub use catalog::sysproc_descriptions;
pub use connection::Connection;
pub use events::ClientEvent;
pub use events::ClientEventKind;
pub use events::ClientEventSink;
pub use events::FileEventSink;
pub use events::NoopEventSink;
pub use events::StderrEventSink;
pub use identity::ConnectionDescriptor;
pub use identity::ConnectionIdentity;
pub use identity::Credential;
pub use identity::build_display;
pub use identity::build_key;
pub use invocation::GuardOutcome;
pub use invocation::GuardedCallback;
pub use queue::CallbackError;
pub use queue::CompletionError;
pub use queue::QueueRun;
pub use queue::QueueStatus;
pub use queue::SequentialQueue;
pub use registry::ConnectionRegistry;
pub use response::ProcedureResponse;
pub use response::ResponseOrigin;
pub use settings::ClientSettings;
pub use settings::Scheme;
pub use transport::HttpTransport;
pub use transport::Transport;
pub use transport::TransportError;
