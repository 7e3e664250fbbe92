// crates/dbmonitor-core/tests/queue.rs
// ============================================================================
// Module: Sequential Queue Tests
// Description: Ordering, failure propagation, and completion semantics.
// Purpose: Prove one call in flight at a time and correct stop behavior.
// Dependencies: dbmonitor-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Drives queues against the scripted transport: ordered dispatch with slow
//! items, `[A, B, C]` with a failing `B` in both failure modes, callback and
//! completion handler errors, and restart rules.

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
use std::sync::Mutex;
use std::time::Duration;

use dbmonitor_core::CallbackError;
use dbmonitor_core::ClientEventKind;
use dbmonitor_core::CompletionError;
use dbmonitor_core::QueueStatus;
use serde_json::json;
use tokio::sync::oneshot;

use crate::common::ScriptedTransport;
use crate::common::local_descriptor;
use crate::common::registry;
use crate::common::server_failure;

// ============================================================================
// SECTION: Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn items_run_in_order_one_at_a_time() {
    let transport = ScriptedTransport::new();
    transport.delay("@Pause", Duration::from_millis(500));
    transport.delay("@Resume", Duration::from_millis(10));
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let order = Arc::new(Mutex::new(Vec::new()));
    let queue = connection.queue();
    assert!(queue.start(false));
    for procedure in ["@Pause", "@Resume", "@Promote"] {
        let order = Arc::clone(&order);
        queue.enqueue(procedure, Vec::new(), move |_| {
            order.lock().unwrap().push(procedure);
            Ok(())
        });
    }
    assert_eq!(queue.pending(), 3);

    let run = queue.finalize(
        |(), success| {
            assert!(success);
            Ok(())
        },
        (),
    );
    assert!(run.unwrap().wait().await);
    assert_eq!(*order.lock().unwrap(), vec!["@Pause", "@Resume", "@Promote"]);
    assert_eq!(transport.procedures(), vec!["@Pause", "@Resume", "@Promote"]);
    assert_eq!(transport.max_in_flight(), 1);
    assert_eq!(queue.status(), QueueStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn empty_queue_completes_immediately_with_success() {
    let transport = ScriptedTransport::new();
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(true);
    let (sender, receiver) = oneshot::channel();
    let run = queue.finalize(
        move |sender: oneshot::Sender<bool>, success| {
            let _ = sender.send(success);
            Ok(())
        },
        sender,
    );
    assert!(run.is_some());
    assert!(receiver.await.unwrap());
    assert!(transport.calls().is_empty());
}

// ============================================================================
// SECTION: Failure Modes
// ============================================================================

/// Runs `[A, B, C]` with `B` failing and returns (dispatched, success).
async fn run_with_failing_middle(continue_on_failure: bool) -> (Vec<String>, bool) {
    let transport = ScriptedTransport::new();
    transport.respond("@Resume", server_failure(-2, "unexpected failure"));
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(continue_on_failure);
    queue.enqueue_call("@Pause", Vec::new());
    queue.enqueue_call("@Resume", Vec::new());
    queue.enqueue_call("@Promote", Vec::new());
    let (sender, receiver) = oneshot::channel();
    let _ = queue.finalize(
        move |sender: oneshot::Sender<bool>, success| {
            let _ = sender.send(success);
            Ok(())
        },
        sender,
    );
    let success = receiver.await.unwrap();
    assert_eq!(queue.pending(), 0);
    (transport.procedures(), success)
}

#[tokio::test(start_paused = true)]
async fn failure_stops_sequence_by_default() {
    let (dispatched, success) = run_with_failing_middle(false).await;
    assert_eq!(dispatched, vec!["@Pause", "@Resume"]);
    assert!(!success);
}

#[tokio::test(start_paused = true)]
async fn continue_on_failure_dispatches_remaining_items() {
    let (dispatched, success) = run_with_failing_middle(true).await;
    assert_eq!(dispatched, vec!["@Pause", "@Resume", "@Promote"]);
    assert!(!success);
}

#[tokio::test(start_paused = true)]
async fn timed_out_item_counts_as_failure() {
    let transport = ScriptedTransport::new();
    transport.delay("@Pause", Duration::from_secs(60));
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    let seen = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);
    queue.enqueue("@Pause", Vec::new(), move |response| {
        *record.lock().unwrap() = Some(response.is_timeout());
        Ok(())
    });
    queue.enqueue_call("@Resume", Vec::new());
    let run = queue.finalize(|(), _| Ok(()), ()).unwrap();
    assert!(!run.wait().await);
    assert_eq!(*seen.lock().unwrap(), Some(true));
    assert_eq!(transport.procedures(), vec!["@Pause"]);
}

#[tokio::test(start_paused = true)]
async fn callback_error_marks_failure_and_is_recorded() {
    let transport = ScriptedTransport::new();
    let (registry, events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue("@Pause", Vec::new(), |_| Err(CallbackError::new("bad rows")));
    queue.enqueue_call("@Resume", Vec::new());
    let run = queue.finalize(|(), _| Ok(()), ()).unwrap();
    assert!(!run.wait().await);
    assert_eq!(transport.procedures(), vec!["@Pause"]);

    let recorded = events.events();
    let callback_event =
        recorded.iter().find(|event| event.event == ClientEventKind::CallbackError).unwrap();
    assert_eq!(callback_event.procedure.as_deref(), Some("@Pause"));
    assert!(callback_event.message.as_deref().unwrap().contains("bad rows"));
}

#[tokio::test(start_paused = true)]
async fn completion_handler_error_is_recorded_not_propagated() {
    let transport = ScriptedTransport::new();
    let (registry, events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue_call("@Pause", Vec::new());
    let run = queue.finalize(|(), _| Err(CompletionError::new("handler broke")), ()).unwrap();
    assert!(run.wait().await);
    assert_eq!(events.kinds(), vec![ClientEventKind::CompletionHandlerError]);
    assert_eq!(queue.status(), QueueStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn panicking_callback_fails_sequence_and_frees_queue() {
    let transport = ScriptedTransport::new();
    let (registry, events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue("@Pause", Vec::new(), |_| panic!("rows were malformed"));
    queue.enqueue_call("@Resume", Vec::new());
    let (sender, receiver) = oneshot::channel();
    let run = queue.finalize(
        move |sender: oneshot::Sender<bool>, success| {
            let _ = sender.send(success);
            Ok(())
        },
        sender,
    );
    assert!(!run.unwrap().wait().await);
    assert!(!receiver.await.unwrap());
    assert_eq!(transport.procedures(), vec!["@Pause"]);
    assert_eq!(queue.status(), QueueStatus::Idle);

    let recorded = events.events();
    let callback_event =
        recorded.iter().find(|event| event.event == ClientEventKind::CallbackError).unwrap();
    assert!(callback_event.message.as_deref().unwrap().contains("rows were malformed"));

    assert!(queue.start(false));
    queue.enqueue_call("@Resume", Vec::new());
    assert!(queue.finalize(|(), _| Ok(()), ()).unwrap().wait().await);
}

#[tokio::test(start_paused = true)]
async fn panicking_completion_handler_is_recorded() {
    let transport = ScriptedTransport::new();
    let (registry, events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue_call("@Pause", Vec::new());
    let run = queue.finalize(|(), _| panic!("handler exploded"), ()).unwrap();
    assert!(run.wait().await);
    assert_eq!(events.kinds(), vec![ClientEventKind::CompletionHandlerError]);
    assert!(events.events()[0].message.as_deref().unwrap().contains("handler exploded"));
    assert_eq!(queue.status(), QueueStatus::Idle);
    assert!(queue.start(true));
}

#[tokio::test(start_paused = true)]
async fn encoding_error_in_sequence_fails_it() {
    let transport = ScriptedTransport::new();
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue_call("@Unknown", vec![json!(1)]);
    queue.enqueue_call("@Pause", Vec::new());
    let run = queue.finalize(|(), _| Ok(()), ()).unwrap();
    assert!(!run.wait().await);
    assert!(transport.calls().is_empty());
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn start_is_refused_while_draining_and_allowed_after() {
    let transport = ScriptedTransport::new();
    transport.delay("@Pause", Duration::from_secs(1));
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue_call("@Pause", Vec::new());
    let run = queue.finalize(|(), _| Ok(()), ()).unwrap();
    assert_eq!(queue.status(), QueueStatus::Draining);
    assert!(!queue.start(true));
    assert!(queue.finalize(|(), _| Ok(()), ()).is_none());
    assert!(run.wait().await);

    assert!(queue.start(false));
    assert_eq!(queue.status(), QueueStatus::Started);
    assert!(queue.succeeded());
}

#[tokio::test(start_paused = true)]
async fn items_enqueued_while_draining_are_dispatched() {
    let transport = ScriptedTransport::new();
    transport.delay("@Pause", Duration::from_secs(1));
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue_call("@Pause", Vec::new());
    let run = queue.finalize(|(), _| Ok(()), ()).unwrap();
    queue.enqueue_call("@Resume", Vec::new());
    assert!(run.wait().await);
    assert_eq!(transport.procedures(), vec!["@Pause", "@Resume"]);
}

#[tokio::test(start_paused = true)]
async fn restart_resets_success_flag() {
    let transport = ScriptedTransport::new();
    transport.respond("@Pause", server_failure(-2, "no")).respond("@Pause", server_failure(1, ""));
    let (registry, _events) = registry(&transport);
    let connection = registry.open(&local_descriptor("DASHBOARD"));

    let queue = connection.queue();
    queue.start(false);
    queue.enqueue_call("@Pause", Vec::new());
    assert!(!queue.finalize(|(), _| Ok(()), ()).unwrap().wait().await);
    assert!(!queue.succeeded());

    queue.start(false);
    assert!(queue.succeeded());
    queue.enqueue_call("@Pause", Vec::new());
    assert!(queue.finalize(|(), _| Ok(()), ()).unwrap().wait().await);
}
