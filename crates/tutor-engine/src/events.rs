//! Turn events and WebSocket streaming for live session observation.
//!
//! [`EventBroadcaster`] is a [`TurnSink`]: plug it into the
//! [`SessionManager`](crate::SessionManager) and every committed turn is
//! published to subscribers with expected answers stripped. The `/ws` route
//! forwards those events to WebSocket clients as JSON objects with `event`
//! and `payload` fields; `/ws?sessionId=<id>` narrows the stream to one
//! session.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects
//! - `turn` - A step was emitted to a learner
//! - `redirect` - A session fell back to topic selection
//! - `session_ended` - A session closed, with its summary
//!
//! # Example
//!
//! ```
//! use tutor_engine::events::{EventBroadcaster, TutorEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(TutorEvent::connected(0));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "connected");
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::session::SessionSummary;
use crate::turn::{TopicPrompt, TurnInstruction, TurnSink};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    /// Sessions currently held by the host.
    pub active_sessions: usize,
    /// When the client connected.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `turn` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPayload {
    /// Session the step was emitted in.
    pub session_id: String,
    /// The emitted instruction.
    pub instruction: TurnInstruction,
}

/// Payload for the `redirect` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectPayload {
    /// Redirected session.
    pub session_id: String,
    /// Prompt shown to the learner.
    pub prompt: TopicPrompt,
}

/// Payload for the `session_ended` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedPayload {
    /// Closed session.
    pub session_id: String,
    /// Final summary.
    pub summary: SessionSummary,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum TutorEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A step was emitted.
    Turn(TurnPayload),
    /// A session returned to topic selection.
    Redirect(RedirectPayload),
    /// A session ended.
    SessionEnded(SessionEndedPayload),
}

impl TutorEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub fn connected(active_sessions: usize) -> Self {
        Self::Connected(ConnectedPayload {
            active_sessions,
            timestamp: Utc::now(),
        })
    }

    /// Session the event belongs to; `None` for `connected`.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Connected(_) => None,
            Self::Turn(payload) => Some(&payload.session_id),
            Self::Redirect(payload) => Some(&payload.session_id),
            Self::SessionEnded(payload) => Some(&payload.session_id),
        }
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Turn(_) => "turn",
            Self::Redirect(_) => "redirect",
            Self::SessionEnded(_) => "session_ended",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts tutor events to all subscribers.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<TutorEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TutorEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning how many subscribers will see it.
    pub fn send(&self, event: TutorEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

impl TurnSink for EventBroadcaster {
    fn on_turn(&self, session_id: &str, instruction: &TurnInstruction) {
        self.send(TutorEvent::Turn(TurnPayload {
            session_id: session_id.to_string(),
            instruction: instruction.redacted(),
        }));
    }

    fn on_redirect(&self, session_id: &str, prompt: &TopicPrompt) {
        self.send(TutorEvent::Redirect(RedirectPayload {
            session_id: session_id.to_string(),
            prompt: prompt.clone(),
        }));
    }

    fn on_session_end(&self, session_id: &str, summary: &SessionSummary) {
        self.send(TutorEvent::SessionEnded(SessionEndedPayload {
            session_id: session_id.to_string(),
            summary: summary.clone(),
        }));
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Query parameters accepted by `/ws`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsFilter {
    /// Only forward events of this session.
    pub session_id: Option<String>,
}

impl WsFilter {
    fn accepts(&self, event: &TutorEvent) -> bool {
        match (&self.session_id, event.session_id()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<WsFilter>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(session_id = ?filter.session_id, "New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state, filter))
}

/// Streams events to one client until it disconnects or stops answering pings.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: WsFilter) {
    let (mut sender, mut receiver) = socket.split();

    let connected = TutorEvent::connected(state.sessions.len().await);
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    let mut events = state.broadcaster.subscribe();
    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring client message");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) if !filter.accepts(&event) => {}
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(event = event.event_name(), "Failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
