// crates/dbmonitor-core/tests/bootstrap.rs
// ============================================================================
// Module: Bootstrap Tests
// Description: Two-phase metadata load and readiness signalling.
// Purpose: Validate metadata keys, sysproc attachment, and ready ordering.
// Dependencies: dbmonitor-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Registers connections against the scripted transport and checks the
//! metadata map, the `on_added` callback, and readiness.

#![allow(dead_code, reason = "Common module may have unused helpers.")]
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

mod common;

use std::sync::Arc;

use dbmonitor_core::ClientEventKind;
use dbmonitor_core::Connection;
use dbmonitor_core::OnConnectionAdded;
use dbmonitor_core::ProcedureCommand;
use dbmonitor_core::ProcedureResponse;
use dbmonitor_core::SYSPROCS_METADATA_KEY;
use dbmonitor_core::sysproc_descriptions;
use serde_json::json;
use tokio::sync::oneshot;

use crate::common::ScriptedTransport;
use crate::common::local_descriptor;
use crate::common::registry;
use crate::common::server_failure;
use crate::common::table;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn on_added_channel() -> (OnConnectionAdded, oneshot::Receiver<(Arc<Connection>, bool)>) {
    let (sender, receiver) = oneshot::channel();
    let callback: OnConnectionAdded = Box::new(move |connection, success| {
        assert!(connection.is_ready(), "ready must be set before notification");
        let _ = sender.send((connection, success));
    });
    (callback, receiver)
}

// ============================================================================
// SECTION: Commands
// ============================================================================

#[test]
fn command_parameters_and_keys() {
    let with_value = ProcedureCommand::new("@Statistics", "TABLE").with_value(0);
    assert_eq!(with_value.parameters(), vec![json!("TABLE"), json!(0)]);
    assert_eq!(with_value.metadata_key("DASHBOARD"), "@Statistics_TABLE");

    let single = ProcedureCommand::new("@SystemCatalog", "TABLES");
    assert_eq!(single.parameters(), vec![json!("TABLES")]);
    assert_eq!(single.metadata_key("GRAPH_MEMORY"), "@SystemCatalog_TABLES_GRAPH_MEMORY");
    assert_eq!(
        single.metadata_key("TABLE_INFORMATION"),
        "@SystemCatalog_TABLES_TABLE_INFORMATION"
    );

    let spread = ProcedureCommand::new("@Statistics", json!(["MEMORY", 0]));
    assert_eq!(spread.parameters(), vec![json!("MEMORY"), json!(0)]);
    assert_eq!(spread.metadata_key("DASHBOARD"), "@Statistics_MEMORY,0");
    assert_eq!(spread.metadata_key("GRAPH_MEMORY"), "@Statistics_MEMORY,0_GRAPH_MEMORY");
}

#[test]
fn commands_deserialize_without_value() {
    let command: ProcedureCommand =
        serde_json::from_value(json!({"procedure": "@SystemInformation", "parameter": "OVERVIEW"}))
            .unwrap();
    assert_eq!(command, ProcedureCommand::new("@SystemInformation", "OVERVIEW"));
}

#[test]
fn commands_reject_unknown_keys() {
    let result = serde_json::from_value::<ProcedureCommand>(json!({
        "procedure": "@SnapshotRestore",
        "parameter": "/tmp/snap",
        "vaule": "nonce"
    }));
    assert!(result.is_err());
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn bootstrap_stores_first_result_and_sysprocs() {
    let transport = ScriptedTransport::new();
    let row = table(&[json!(["node-1", 42])]);
    transport
        .respond("@Statistics", ProcedureResponse::success(vec![row.clone(), json!("ignored")]));
    let (registry, events) = registry(&transport);
    let (on_added, receiver) = on_added_channel();

    let connection = registry.add(
        &local_descriptor("DASHBOARD"),
        vec![ProcedureCommand::new("@Statistics", "TABLE").with_value(0)],
        Some(on_added),
    );
    assert!(!connection.is_ready());

    let (notified, success) = receiver.await.unwrap();
    assert!(success);
    assert!(Arc::ptr_eq(&notified, &connection));
    assert!(connection.is_ready());
    assert_eq!(connection.metadata_value("@Statistics_TABLE"), Some(row));
    assert_eq!(connection.metadata_value(SYSPROCS_METADATA_KEY), Some(sysproc_descriptions()));
    assert_eq!(transport.calls()[0].parameters(), "[\"TABLE\",0]");
    assert_eq!(
        events.kinds(),
        vec![ClientEventKind::ConnectionAdded, ClientEventKind::ConnectionReady]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_command_still_becomes_ready_with_failure_flag() {
    let transport = ScriptedTransport::new();
    transport.respond("@SystemCatalog", server_failure(-2, "catalog unavailable"));
    let (registry, _events) = registry(&transport);
    let (on_added, receiver) = on_added_channel();

    let connection = registry.add(
        &local_descriptor("GRAPH_MEMORY"),
        vec![
            ProcedureCommand::new("@SystemCatalog", "TABLES"),
            ProcedureCommand::new("@Statistics", "MEMORY").with_value(0),
        ],
        Some(on_added),
    );
    let (_, success) = receiver.await.unwrap();
    assert!(!success);
    assert!(connection.is_ready());
    assert_eq!(connection.metadata_value("@SystemCatalog_TABLES_GRAPH_MEMORY"), Some(json!(null)));
    assert_eq!(connection.metadata_value("@Statistics_MEMORY_GRAPH_MEMORY"), None);
    assert_eq!(transport.procedures(), vec!["@SystemCatalog"]);
    assert!(connection.metadata_value(SYSPROCS_METADATA_KEY).is_some());
}

#[tokio::test(start_paused = true)]
async fn wait_ready_resolves_without_callback() {
    let transport = ScriptedTransport::new();
    let (registry, _events) = registry(&transport);
    let connection = registry.add(&local_descriptor("DASHBOARD"), Vec::new(), None);
    connection.wait_ready().await;
    assert!(connection.is_ready());
    assert_eq!(connection.metadata().len(), 1);
    assert!(connection.procedure_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn update_reruns_bootstrap_with_new_commands() {
    let transport = ScriptedTransport::new();
    transport.respond("@SystemInformation", ProcedureResponse::success(vec![json!({"v": 2})]));
    let (registry, _events) = registry(&transport);
    let connection = registry.add(&local_descriptor("DASHBOARD"), Vec::new(), None);
    connection.wait_ready().await;

    let (on_added, receiver) = on_added_channel();
    let commands = vec![ProcedureCommand::new("@SystemInformation", "OVERVIEW")];
    registry.update(&connection, commands.clone(), Some(on_added));
    assert!(receiver.await.unwrap().1);
    assert_eq!(connection.procedure_commands(), commands);
    assert_eq!(connection.metadata_value("@SystemInformation_OVERVIEW"), Some(json!({"v": 2})));
}

#[tokio::test(start_paused = true)]
async fn refresh_metadata_overwrites_entries() {
    let transport = ScriptedTransport::new();
    transport
        .respond("@Statistics", ProcedureResponse::success(vec![json!("first")]))
        .respond("@Statistics", ProcedureResponse::success(vec![json!("second")]));
    let (registry, _events) = registry(&transport);
    let commands = vec![ProcedureCommand::new("@Statistics", "TABLE").with_value(0)];
    let connection = registry.add(&local_descriptor("DASHBOARD"), commands.clone(), None);
    connection.wait_ready().await;
    assert_eq!(connection.metadata_value("@Statistics_TABLE"), Some(json!("first")));

    let run = connection.refresh_metadata(&commands).unwrap();
    assert!(run.wait().await);
    assert_eq!(connection.metadata_value("@Statistics_TABLE"), Some(json!("second")));
}
