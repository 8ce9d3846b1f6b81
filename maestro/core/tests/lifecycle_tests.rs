//! Conductor lifecycle tests
//!
//! Run a full conductor on channels and check message ordering, single-flight
//! replacement, cancellation, reset and refinement across requests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::{chunk_text, note_line, tok, Harness, ScriptedBackend, Step};
use maestro_core::backend::{BackendError, ChatRole};
use maestro_core::error::UNAVAILABLE_MESSAGE;
use maestro_core::{CatalogKey, ClientMessage, ComposeRequest, ConductorConfig, RequestId, ServerMessage};

fn id(s: &str) -> RequestId {
    RequestId::from(s)
}

fn done_script(lines: &[String]) -> Vec<Step> {
    let mut script: Vec<Step> = lines.iter().map(|l| tok(l)).collect();
    script.push(Step::Complete);
    script
}

/// Sends one fragment, then keeps the stream open
fn hanging_script() -> Vec<Step> {
    vec![tok("partial"), Step::Wait(Duration::from_secs(3600))]
}

// =============================================================================
// Single request
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_compose_start_chunks_done() {
    let lines = [note_line(0, 60, 500, 0), note_line(500, 62, 500, 0)];
    let backend = Arc::new(ScriptedBackend::new(done_script(&lines)));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness
        .compose(ComposeRequest::new("bright synth arpeggio").with_id("a"))
        .await;
    let seen = harness.until_terminal().await;

    assert_eq!(seen.first(), Some(&ServerMessage::Start { id: id("a") }));
    assert_eq!(seen.last(), Some(&ServerMessage::Done { id: id("a"), catalog_key: None }));
    assert_eq!(chunk_text(&seen), lines.concat());
    assert!(seen.iter().all(|m| m.request_id() == Some(&id("a"))));

    let session = harness.close().await;
    assert_eq!(session.notes().len(), 2);
    assert_eq!(session.original_prompt(), Some("bright synth arpeggio"));
    assert!(session.can_refine());

    let request = &backend.requests()[0];
    assert_eq!(request.model, "scripted-model");
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, ChatRole::System);
    assert_eq!(request.messages[1].content, "Compose: bright synth arpeggio");
}

#[tokio::test(start_paused = true)]
async fn test_ping_answered_while_idle() {
    let mut harness = Harness::start(Arc::new(ScriptedBackend::new(Vec::new())));
    harness.send(ClientMessage::Ping).await;
    assert_eq!(harness.recv().await, ServerMessage::Pong);
    harness.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_ping_answered_while_active() {
    let mut harness = Harness::start(Arc::new(ScriptedBackend::new(hanging_script())));
    harness.compose(ComposeRequest::new("drone").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });
    assert!(matches!(harness.recv().await, ServerMessage::Chunk { .. }));

    harness.send(ClientMessage::Ping).await;
    assert_eq!(harness.recv().await, ServerMessage::Pong);

    let (_, rest) = harness.close_and_drain().await;
    assert_eq!(rest, vec![ServerMessage::Cancelled { id: id("a") }]);
}

// =============================================================================
// Single flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_new_compose_cancels_previous_before_start() {
    let lines = [note_line(0, 67, 250, 2)];
    let backend = Arc::new(ScriptedBackend::sequence(vec![hanging_script(), done_script(&lines)]));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness.compose(ComposeRequest::new("first idea").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });
    assert_eq!(
        harness.recv().await,
        ServerMessage::Chunk { id: id("a"), data: "partial".into() }
    );

    harness.compose(ComposeRequest::new("second idea").with_id("b")).await;
    assert_eq!(harness.recv().await, ServerMessage::Cancelled { id: id("a") });
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("b") });
    let seen = harness.until_terminal().await;
    assert_eq!(seen.last(), Some(&ServerMessage::Done { id: id("b"), catalog_key: None }));
    assert!(seen.iter().all(|m| m.request_id() == Some(&id("b"))));

    let session = harness.close().await;
    assert_eq!(session.notes().len(), 1);
    assert_eq!(session.original_prompt(), Some("second idea"));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_compose_while_active_still_cancels() {
    let backend = Arc::new(ScriptedBackend::new(hanging_script()));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness.compose(ComposeRequest::new("first").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });

    harness.compose(ComposeRequest::new("   ").with_id("b")).await;
    let mut next = harness.recv().await;
    if matches!(next, ServerMessage::Chunk { .. }) {
        next = harness.recv().await;
    }
    assert_eq!(next, ServerMessage::Cancelled { id: id("a") });
    assert_eq!(
        harness.recv().await,
        ServerMessage::Error {
            id: Some(id("b")),
            message: "Prompt cannot be empty.".into()
        }
    );

    harness.close().await;
    assert_eq!(backend.calls(), 1);
}

// =============================================================================
// Cancel and reset
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_while_idle_is_silent() {
    let mut harness = Harness::start(Arc::new(ScriptedBackend::new(Vec::new())));
    harness.send(ClientMessage::Cancel).await;
    harness.send(ClientMessage::Cancel).await;
    harness.send(ClientMessage::Ping).await;
    assert_eq!(harness.recv().await, ServerMessage::Pong);
    harness.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_active_keeps_partial_output_out_of_session() {
    let mut harness = Harness::start(Arc::new(ScriptedBackend::new(vec![
        tok(&note_line(0, 60, 500, 0)),
        Step::Wait(Duration::from_secs(3600)),
    ])));

    harness.compose(ComposeRequest::new("ambient").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });
    assert!(matches!(harness.recv().await, ServerMessage::Chunk { .. }));

    harness.send(ClientMessage::Cancel).await;
    assert_eq!(harness.recv().await, ServerMessage::Cancelled { id: id("a") });

    let session = harness.close().await;
    assert!(session.notes().is_empty());
    assert!(!session.can_refine());
}

#[tokio::test(start_paused = true)]
async fn test_reset_then_refine_starts_fresh() {
    let backend = Arc::new(ScriptedBackend::new(done_script(&[note_line(0, 60, 500, 0)])));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness.compose(ComposeRequest::new("piano waltz").with_id("a")).await;
    harness.until_terminal().await;

    harness.send(ClientMessage::Reset).await;
    assert_eq!(harness.recv().await, ServerMessage::SessionCleared);

    harness
        .compose(ComposeRequest::new("add strings").with_id("b").refining())
        .await;
    harness.until_terminal().await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 2);
    assert_eq!(requests[1].messages[1].content, "Compose: add strings");

    let session = harness.close().await;
    assert_eq!(session.original_prompt(), Some("add strings"));
}

#[tokio::test(start_paused = true)]
async fn test_clear_session_alias_cancels_active() {
    let mut harness = Harness::start(Arc::new(ScriptedBackend::new(hanging_script())));
    harness.compose(ComposeRequest::new("x").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });

    let reset: ClientMessage = serde_json::from_str(r#"{"type":"clear_session"}"#).unwrap();
    harness.send(reset).await;

    let mut next = harness.recv().await;
    if matches!(next, ServerMessage::Chunk { .. }) {
        next = harness.recv().await;
    }
    assert_eq!(next, ServerMessage::Cancelled { id: id("a") });
    assert_eq!(harness.recv().await, ServerMessage::SessionCleared);

    let session = harness.close().await;
    assert_eq!(session.original_prompt(), None);
}

// =============================================================================
// Refinement
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_refine_appends_after_existing_notes() {
    let backend = Arc::new(ScriptedBackend::sequence(vec![
        done_script(&[note_line(0, 60, 500, 0), note_line(500, 62, 500, 1)]),
        done_script(&[note_line(1000, 64, 500, 1)]),
    ]));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness.compose(ComposeRequest::new("techno groove").with_id("a")).await;
    harness.until_terminal().await;
    harness
        .compose(ComposeRequest::new("add a bassline").with_id("b").refining())
        .await;
    let seen = harness.until_terminal().await;
    assert_eq!(seen.last(), Some(&ServerMessage::Done { id: id("b"), catalog_key: None }));

    let requests = backend.requests();
    let refine = &requests[1].messages;
    assert_eq!(refine.len(), 3);
    assert!(refine[0].content.contains("The existing sequence ends at time 1000ms."));
    assert!(refine[0].content.contains("Instrument bank: Electronic"));
    assert_eq!(refine[1].content, "The existing composition is: techno groove");
    assert_eq!(refine[2].content, "Add to the composition: add a bassline");

    let session = harness.close().await;
    assert_eq!(session.notes().len(), 3);
    assert_eq!(session.end_time_ms(), 1500);
    // The original prompt survives refinement
    assert_eq!(session.original_prompt(), Some("techno groove"));
}

#[tokio::test(start_paused = true)]
async fn test_refine_without_notes_is_fresh() {
    let backend = Arc::new(ScriptedBackend::new(done_script(&[note_line(0, 60, 500, 0)])));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness
        .compose(ComposeRequest::new("lullaby").with_id("a").refining())
        .await;
    harness.until_terminal().await;

    assert_eq!(backend.requests()[0].messages[1].content, "Compose: lullaby");
    harness.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_model_selected_bank_carries_into_refine() {
    let backend = Arc::new(ScriptedBackend::sequence(vec![
        done_script(&["{\"bank\": \"retro\"}\n".to_string(), note_line(0, 72, 200, 4)]),
        done_script(&[note_line(200, 74, 200, 4)]),
    ]));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness
        .compose(ComposeRequest::new("chiptune boss fight").with_id("a").with_catalog("auto"))
        .await;
    let seen = harness.until_terminal().await;
    assert_eq!(
        seen.last(),
        Some(&ServerMessage::Done { id: id("a"), catalog_key: Some(CatalogKey::Retro) })
    );

    harness
        .compose(ComposeRequest::new("faster").with_id("b").refining())
        .await;
    let seen = harness.until_terminal().await;
    assert_eq!(
        seen.last(),
        Some(&ServerMessage::Done { id: id("b"), catalog_key: Some(CatalogKey::Retro) })
    );
    assert!(backend.requests()[1].messages[0]
        .content
        .contains("Instrument bank: Retro/8-bit"));

    let session = harness.close().await;
    assert_eq!(session.catalog(), Some(CatalogKey::Retro));
}

#[tokio::test(start_paused = true)]
async fn test_pinned_bank_in_prompt_and_done() {
    let backend = Arc::new(ScriptedBackend::new(done_script(&[note_line(0, 48, 1000, 7)])));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness
        .compose(ComposeRequest::new("epic trailer").with_id("a").with_catalog("orchestral"))
        .await;
    let seen = harness.until_terminal().await;

    assert_eq!(
        seen.last(),
        Some(&ServerMessage::Done { id: id("a"), catalog_key: Some(CatalogKey::Orchestral) })
    );
    assert!(backend.requests()[0].messages[0]
        .content
        .contains("Instrument Bank: Orchestral/Cinematic"));
    harness.close().await;
}

// =============================================================================
// Validation and routing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_prompt_validation_errors() {
    let backend = Arc::new(ScriptedBackend::new(Vec::new()));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness.compose(ComposeRequest::new(" \t ").with_id("a")).await;
    assert_eq!(
        harness.recv().await,
        ServerMessage::Error {
            id: Some(id("a")),
            message: "Prompt cannot be empty.".into()
        }
    );

    harness.compose(ComposeRequest::new("x".repeat(513)).with_id("b")).await;
    assert_eq!(
        harness.recv().await,
        ServerMessage::Error {
            id: Some(id("b")),
            message: "Prompt too long (max 512 chars).".into()
        }
    );

    let session = harness.close().await;
    assert_eq!(backend.calls(), 0);
    assert_eq!(session.original_prompt(), None);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_provider_rejected() {
    let backend = Arc::new(ScriptedBackend::new(Vec::new()));
    let mut harness = Harness::start(Arc::clone(&backend));

    harness
        .compose(ComposeRequest::new("jazz").with_id("a").with_model("nope", "m"))
        .await;
    assert_eq!(
        harness.recv().await,
        ServerMessage::Error {
            id: Some(id("a")),
            message: "Unknown provider: nope".into()
        }
    );
    harness.close().await;
    assert_eq!(backend.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_backend_after_start() {
    let backend = Arc::new(ScriptedBackend::refusing(BackendError::Unavailable("refused".into())));
    let mut harness = Harness::start(backend);

    harness.compose(ComposeRequest::new("jazz").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });
    assert_eq!(
        harness.recv().await,
        ServerMessage::Error {
            id: Some(id("a")),
            message: UNAVAILABLE_MESSAGE.into()
        }
    );
    harness.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_max_tokens_defaulted_and_clamped() {
    let backend = Arc::new(ScriptedBackend::new(done_script(&[])));
    let config = ConductorConfig {
        default_max_tokens: 4096,
        ..common::scripted_config()
    };
    let mut harness = Harness::start_with(Arc::clone(&backend), config);

    harness.compose(ComposeRequest::new("a").with_id("a")).await;
    harness.until_terminal().await;
    harness
        .compose(ComposeRequest::new("b").with_id("b").with_max_tokens(10_000_000))
        .await;
    harness.until_terminal().await;

    let requests = backend.requests();
    assert_eq!(requests[0].max_tokens, 4096);
    assert_eq!(requests[1].max_tokens, 100_000);
    harness.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_closing_connection_cancels_generation() {
    let mut harness = Harness::start(Arc::new(ScriptedBackend::new(hanging_script())));
    harness.compose(ComposeRequest::new("endless").with_id("a")).await;
    assert_eq!(harness.recv().await, ServerMessage::Start { id: id("a") });

    let (session, rest) = harness.close_and_drain().await;
    assert_eq!(rest.last(), Some(&ServerMessage::Cancelled { id: id("a") }));
    assert!(session.notes().is_empty());
}
