//! WebSocket handler: session, subscriptions and procedure calls.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming binary frames → decode + dispatch by syscall
//! - Channel events queued for this connection → forward to client
//!
//! Handlers validate, call into services and return an `Outcome`. The
//! dispatch layer owns all outbound concerns: the reply to the sender and
//! publication to channel subscribers.
//!
//! LIFECYCLE
//! =========
//! 1. Client sends `session:hello` naming the realm → done `{session_id}`
//! 2. Subscribe / unsubscribe / procedure calls → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / reply + publish)
//! 4. Close → drop every subscription of the connection

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{
    ErrorCode, FRAME_CODE, FRAME_MESSAGE, FRAME_RESULT, FRAME_SUBSCRIPTION, Frame, SYSCALL_HELLO,
    SYSCALL_SUBSCRIBE, SYSCALL_UNSUBSCRIBE, Status,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::{self, chat};
use crate::state::AppState;

/// Queue depth for events pushed to one connection.
const CLIENT_QUEUE: usize = 256;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. Handlers never send frames directly.
#[derive(Debug)]
enum Outcome {
    /// Send done+data to sender only.
    Reply(Value),
    /// Send empty done to sender only.
    Done,
    /// Reply to sender, then publish to every subscriber of the channel.
    ReplyAndPublish { reply: Value, publication: chat::Publication },
}

/// Per-connection protocol state.
#[derive(Debug)]
struct ClientSession {
    client_id: Uuid,
    /// Set once `session:hello` succeeded.
    open: bool,
}

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("session:hello required before {0}")]
    NotOpen(String),
    #[error("no such realm: {0}")]
    NoSuchRealm(String),
    #[error("session already open")]
    AlreadyOpen,
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotOpen(_) => "E_NO_SESSION",
            Self::NoSuchRealm(_) => "E_NO_SUCH_REALM",
            Self::AlreadyOpen => "E_SESSION_OPEN",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut session = ClientSession { client_id: Uuid::new_v4(), open: false };
    let client_id = session.client_id;
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_QUEUE);
    info!(%client_id, "ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Binary(bytes) => {
                        for frame in process_inbound_bytes(&state, &mut session, &client_tx, &bytes).await {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    let parted = services::channel::part_all(&state, client_id).await;
    info!(%client_id, subscriptions = parted, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Decode and process one inbound frame and return frames for the sender.
///
/// Kept apart from the socket so tests can drive dispatch directly.
async fn process_inbound_bytes(
    state: &AppState,
    session: &mut ClientSession,
    client_tx: &mpsc::Sender<Frame>,
    bytes: &[u8],
) -> Vec<Frame> {
    let req = match frames::decode_frame(bytes) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(client_id = %session.client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Value::Null).with_data(FRAME_MESSAGE, format!("invalid frame: {e}"));
            return vec![err];
        }
    };
    if req.status != Status::Request {
        debug!(client_id = %session.client_id, syscall = %req.syscall, status = ?req.status, "ws: ignoring non-request frame");
        return Vec::new();
    }
    info!(client_id = %session.client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.syscall.as_str() {
        SYSCALL_HELLO => handle_hello(state, session, &req),
        _ if !session.open => Err(req.error_from(&SessionError::NotOpen(req.syscall.clone()))),
        SYSCALL_SUBSCRIBE => handle_subscribe(state, session, client_tx, &req).await,
        SYSCALL_UNSUBSCRIBE => handle_unsubscribe(state, session, &req).await,
        _ => handle_procedure(state, &req),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::ReplyAndPublish { reply, publication }) => {
            let delivered = services::channel::publish(state, &publication.channel, &publication.payload).await;
            debug!(channel = %publication.channel, delivered, "ws: published");
            vec![req.done_with(reply)]
        }
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn handle_hello(state: &AppState, session: &mut ClientSession, req: &Frame) -> Result<Outcome, Frame> {
    if session.open {
        return Err(req.error_from(&SessionError::AlreadyOpen));
    }
    let realm = req.data.get("realm").and_then(Value::as_str).unwrap_or_default();
    if realm != &*state.realm {
        return Err(req.error_from(&SessionError::NoSuchRealm(realm.to_owned())));
    }
    session.open = true;
    info!(client_id = %session.client_id, %realm, "ws: session open");
    Ok(Outcome::Reply(json!({ "session_id": session.client_id.to_string() })))
}

async fn handle_subscribe(
    state: &AppState,
    session: &ClientSession,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let channel = req
        .channel
        .as_deref()
        .or_else(|| req.data.get("channel").and_then(Value::as_str))
        .unwrap_or_default();
    match services::channel::subscribe(state, channel, session.client_id, client_tx.clone()).await {
        Ok(subscription) => Ok(Outcome::Reply(json!({ FRAME_SUBSCRIPTION: subscription }))),
        Err(e) => Err(req.error_from(&e)),
    }
}

async fn handle_unsubscribe(state: &AppState, session: &ClientSession, req: &Frame) -> Result<Outcome, Frame> {
    let subscription = req.data.get(FRAME_SUBSCRIPTION).and_then(Value::as_str).unwrap_or_default();
    match services::channel::unsubscribe(state, session.client_id, subscription).await {
        Ok(()) => Ok(Outcome::Done),
        Err(e) => Err(req.error_from(&e)),
    }
}

fn handle_procedure(state: &AppState, req: &Frame) -> Result<Outcome, Frame> {
    let args = req.args();
    match req.syscall.as_str() {
        chat::PROC_SEND => match chat::send_message(state, args) {
            Ok(publication) => Ok(Outcome::ReplyAndPublish { reply: json!({ FRAME_RESULT: Value::Null }), publication }),
            Err(e) => Err(req.error_from(&e)),
        },
        chat::PROC_HISTORY => match chat::get_history(state, args) {
            Ok(rows) => Ok(Outcome::Reply(json!({ FRAME_RESULT: rows }))),
            Err(e) => Err(req.error_from(&e)),
        },
        other => Err(req.error_from(&chat::ChatError::UnknownProcedure(other.to_owned()))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    if frame.status == Status::Error {
        let code = frame.data.get(FRAME_CODE).and_then(Value::as_str).unwrap_or("-");
        let message = frame.data.get(FRAME_MESSAGE).and_then(Value::as_str).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Binary(frames::encode_frame(frame).into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
