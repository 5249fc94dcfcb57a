//! Integration tests for the HTTP host and WebSocket turn events.
//!
//! Each test binds a real server on a free port, drives sessions with
//! `reqwest`, and watches the `/ws` stream with `tokio-tungstenite`.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;
use tutor_engine::{create_router, AppState, ConceptGraph, Config, TutorEvent};

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

fn test_state() -> AppState {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures");
    let config = Config::load_from_file(&dir.join("tutor.json")).expect("Failed to load config");
    let graph = ConceptGraph::load(dir.join(&config.concept_bank))
        .expect("Failed to load concept bank")
        .with_threshold_overrides(&config.mastery_thresholds)
        .expect("Failed to apply thresholds");
    AppState::new(Arc::new(graph), &config)
}

/// Spawns the server and returns its base HTTP URL.
async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

async fn connect_client(http_url: &str) -> WsClient {
    connect_to(&format!("{}/ws", http_url.replacen("http", "ws", 1))).await
}

async fn connect_to(ws_url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next event, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> TutorEvent {
    serde_json::from_value(receive_json(client).await).expect("Failed to parse event")
}

/// Receives the next event as raw JSON.
async fn receive_json(client: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Invalid JSON event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

async fn create_session(http: &reqwest::Client, base: &str) -> serde_json::Value {
    let response = http
        .post(format!("{base}/api/sessions"))
        .json(&serde_json::json!({"learnerId": "ada"}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    response.json().await.expect("Invalid JSON")
}

async fn submit(
    http: &reqwest::Client,
    base: &str,
    session_id: &str,
    text: &str,
) -> reqwest::Response {
    http.post(format!("{base}/api/sessions/{session_id}/responses"))
        .json(&serde_json::json!({"text": text}))
        .send()
        .await
        .expect("Request failed")
}

// ============================================================================
// HTTP Tests
// ============================================================================

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let created = create_session(&http, &base).await;
    assert_eq!(created["state"], "topic_selection");
    assert_eq!(created["prompt"]["suggestions"][0], "multiplication");
    let session_id = created["sessionId"].as_str().expect("Missing session id");

    let response = submit(&http, &base, session_id, "multiplication").await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let turn: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(turn["state"], "awaiting_response");
    assert_eq!(turn["outcome"]["kind"], "taught");

    let instructions = turn["outcome"]["instructions"]
        .as_array()
        .expect("Missing instructions");
    assert_eq!(instructions.len(), 2);
    assert_eq!(instructions[1]["step"]["id"], "m-check-1");
    assert!(instructions[1]["step"]["expectedAnswer"].is_null());

    let turn: serde_json::Value = submit(&http, &base, session_id, "12")
        .await
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(turn["outcome"]["directive"], "deepen");
    assert_eq!(turn["outcome"]["signal"], "correct");

    let session: serde_json::Value = http
        .get(format!("{base}/api/sessions/{session_id}"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(session["turn"], 2);
    assert_eq!(session["currentStep"], "m-check-2");

    let summary: serde_json::Value = http
        .post(format!("{base}/api/sessions/{session_id}/end"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(summary["learnerId"], "ada");
    assert_eq!(summary["concepts"][0]["conceptId"], "multiplication");

    // The session is closed now.
    let response = submit(&http, &base, session_id, "42").await;
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
    let error: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert!(error["error"].is_string());

    let stored: serde_json::Value = http
        .get(format!("{base}/api/sessions/{session_id}/summary"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(stored, summary);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let response = submit(&http, &base, "no-such-session", "hello").await;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let response = http
        .get(format!("{base}/api/sessions/no-such-session/summary"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let first = create_session(&http, &base).await;
    let second = create_session(&http, &base).await;
    let first_id = first["sessionId"].as_str().expect("Missing session id");
    let second_id = second["sessionId"].as_str().expect("Missing session id");
    assert_ne!(first_id, second_id);

    submit(&http, &base, first_id, "multiplication").await;
    let response = submit(&http, &base, second_id, "bye").await;
    let turn: serde_json::Value = response.json().await.expect("Invalid JSON");
    assert_eq!(turn["state"], "session_end");

    let first_state: serde_json::Value = http
        .get(format!("{base}/api/sessions/{first_id}"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid JSON");
    assert_eq!(first_state["state"], "awaiting_response");
}

// ============================================================================
// WebSocket Tests
// ============================================================================

#[tokio::test]
async fn test_client_receives_connected_event() {
    let (base, _handle) = spawn_test_server(test_state()).await;

    let mut client = connect_client(&base).await;
    let event = receive_event(&mut client).await;

    match event {
        TutorEvent::Connected(payload) => assert_eq!(payload.active_sessions, 0),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_turns_are_streamed_to_observers() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let mut observer = connect_client(&base).await;
    receive_event(&mut observer).await;

    let created = create_session(&http, &base).await;
    let session_id = created["sessionId"].as_str().expect("Missing session id");
    submit(&http, &base, session_id, "multiplication").await;

    let mut steps = Vec::new();
    for _ in 0..2 {
        match receive_event(&mut observer).await {
            TutorEvent::Turn(payload) => {
                assert_eq!(payload.session_id, session_id);
                steps.push(payload.instruction.step.id);
            }
            other => panic!("Expected Turn event, got: {other:?}"),
        }
    }
    assert_eq!(steps, vec!["m-explain", "m-check-1"]);

    submit(&http, &base, session_id, "poetry please").await;
    http.post(format!("{base}/api/sessions/{session_id}/end"))
        .send()
        .await
        .expect("Request failed");

    // The wrong answer produced more turns; skip to the end event.
    let ended = loop {
        match receive_event(&mut observer).await {
            TutorEvent::SessionEnded(payload) => break payload,
            TutorEvent::Turn(_) => {}
            other => panic!("Unexpected event: {other:?}"),
        }
    };
    assert_eq!(ended.session_id, session_id);
    assert_eq!(ended.summary.turns, 2);
}

#[tokio::test]
async fn test_streamed_turns_hide_expected_answers() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let mut observer = connect_client(&base).await;
    receive_event(&mut observer).await;

    let created = create_session(&http, &base).await;
    let session_id = created["sessionId"].as_str().expect("Missing session id");
    submit(&http, &base, session_id, "multiplication").await;

    for expected_step in ["m-explain", "m-check-1"] {
        let event = receive_json(&mut observer).await;
        assert_eq!(event["event"], "turn");
        let step = &event["payload"]["instruction"]["step"];
        assert_eq!(step["id"], expected_step);
        assert!(step["expectedAnswer"].is_null());
    }
}

#[tokio::test]
async fn test_observer_can_follow_one_session() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let watched = create_session(&http, &base).await;
    let other = create_session(&http, &base).await;
    let watched_id = watched["sessionId"].as_str().expect("Missing session id");
    let other_id = other["sessionId"].as_str().expect("Missing session id");

    let ws_url = format!(
        "{}/ws?sessionId={watched_id}",
        base.replacen("http", "ws", 1)
    );
    let mut observer = connect_to(&ws_url).await;
    receive_event(&mut observer).await;

    submit(&http, &base, other_id, "multiplication").await;
    submit(&http, &base, watched_id, "medieval poetry").await;

    match receive_event(&mut observer).await {
        TutorEvent::Redirect(payload) => assert_eq!(payload.session_id, watched_id),
        other => panic!("Expected Redirect for the watched session, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_is_streamed() {
    let (base, _handle) = spawn_test_server(test_state()).await;
    let http = reqwest::Client::new();

    let mut observer = connect_client(&base).await;
    receive_event(&mut observer).await;

    let created = create_session(&http, &base).await;
    let session_id = created["sessionId"].as_str().expect("Missing session id");
    submit(&http, &base, session_id, "medieval poetry").await;

    match receive_event(&mut observer).await {
        TutorEvent::Redirect(payload) => {
            assert_eq!(payload.session_id, session_id);
            assert!(payload.prompt.diagnostic.is_some());
        }
        other => panic!("Expected Redirect event, got: {other:?}"),
    }
}
