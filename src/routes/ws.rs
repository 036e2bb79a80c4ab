//! WebSocket handler: chat listener subscriptions.
//!
//! DESIGN
//! ======
//! On upgrade the connection enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall
//! - Chat change events from the broadcast channel → fresh snapshots for
//!   every subscription the change touches
//!
//! A subscription is opened by a `chat:channels` or `chat:messages` request
//! and answered with an item frame per snapshot (initial one included). It
//! stays open until the client sends a `cancel` frame whose `parent_id` is the
//! subscribing request's id, or disconnects.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (session cookie required) → send `session:connected`
//! 2. Client subscribes → item frame with the current snapshot
//! 3. Chat mutation anywhere → item frame with the new snapshot
//! 4. Close → subscriptions dropped with the connection

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::auth::AuthUser;
use crate::frame::{Data, Frame, Status};
use crate::model::User;
use crate::services::chat;
use crate::state::AppState;

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// The caller's channel list.
    Channels,
    /// Messages of one channel.
    Messages(String),
}

#[derive(Debug, Clone)]
struct Subscription {
    request: Frame,
    target: Target,
}

impl Subscription {
    fn touched_by(&self, changed: Option<&str>, visible: &[String]) -> bool {
        let Some(changed) = changed else {
            return true;
        };
        match &self.target {
            Target::Channels => visible.iter().any(|id| id == changed),
            Target::Messages(channel_id) => channel_id == changed,
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, auth: AuthUser, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state, auth.user))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user: User) {
    let mut events = state.chat_events.subscribe();
    let mut subscriptions: Vec<Subscription> = Vec::new();

    let welcome = Frame::request("session:connected", Data::new()).with_data("user_id", user.uid.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }
    info!(uid = %user.uid, "ws: client connected");

    loop {
        let frames = tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => process_inbound_text(&state, &user, &mut subscriptions, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => continue,
                }
            }
            event = events.recv() => match event {
                Ok(event) => process_event(&state, &user, &mut subscriptions, Some(&event.channel_id)).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(uid = %user.uid, skipped, "ws: chat events lagged, resending all snapshots");
                    process_event(&state, &user, &mut subscriptions, None).await
                }
                Err(RecvError::Closed) => break,
            },
        };

        if send_all(&mut socket, &frames).await.is_err() {
            break;
        }
    }

    info!(uid = %user.uid, subscriptions = subscriptions.len(), "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
async fn process_inbound_text(
    state: &AppState,
    user: &User,
    subscriptions: &mut Vec<Subscription>,
    text: &str,
) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(uid = %user.uid, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };
    info!(uid = %user.uid, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");

    if req.status == Status::Cancel {
        return vec![cancel(subscriptions, &req)];
    }

    match req.prefix() {
        "chat" => vec![handle_chat(state, user, subscriptions, req).await],
        prefix => vec![req.error(format!("unknown prefix: {prefix}"))],
    }
}

fn cancel(subscriptions: &mut Vec<Subscription>, req: &Frame) -> Frame {
    let before = subscriptions.len();
    subscriptions.retain(|sub| Some(sub.request.id) != req.parent_id);
    if subscriptions.len() == before {
        return req.error("no such subscription");
    }
    req.done()
}

async fn handle_chat(state: &AppState, user: &User, subscriptions: &mut Vec<Subscription>, req: Frame) -> Frame {
    let target = match req.syscall.as_str() {
        "chat:channels" => Target::Channels,
        "chat:messages" => {
            let channel_id = req
                .channel_id
                .clone()
                .or_else(|| req.data.get("channel_id").and_then(|v| v.as_str()).map(str::to_owned));
            let Some(channel_id) = channel_id else {
                return req.error("channel_id required");
            };
            Target::Messages(channel_id)
        }
        other => return req.error(format!("unknown syscall: {other}")),
    };

    let subscription = Subscription { request: req, target };
    match snapshot(state, user, &subscription).await {
        Ok(item) => {
            subscriptions.push(subscription);
            item
        }
        Err(err) => err,
    }
}

/// Item frame with the subscription's current data, or an error frame.
/// Message snapshots carry their channel in `channel_id`.
async fn snapshot(state: &AppState, user: &User, sub: &Subscription) -> Result<Frame, Frame> {
    let req = &sub.request;
    let mut data = Data::new();
    match &sub.target {
        Target::Channels => {
            let channels = chat::user_channels(state, user)
                .await
                .map_err(|e| req.error_from(&e))?;
            data.insert("channels".into(), serde_json::to_value(&channels).unwrap_or_default());
            Ok(req.item(data))
        }
        Target::Messages(channel_id) => {
            let list = chat::channel_messages(state, user, channel_id)
                .await
                .map_err(|e| req.error_from(&e))?;
            data.insert("channel_id".into(), serde_json::json!(list.channel_id));
            data.insert("messages".into(), serde_json::to_value(&list.messages).unwrap_or_default());
            Ok(req.item(data).with_channel_id(list.channel_id))
        }
    }
}

/// Snapshots for subscriptions touched by a change to `changed` (all of
/// them when `None`). A subscription whose snapshot fails is closed.
async fn process_event(
    state: &AppState,
    user: &User,
    subscriptions: &mut Vec<Subscription>,
    changed: Option<&str>,
) -> Vec<Frame> {
    if subscriptions.is_empty() {
        return Vec::new();
    }
    let visible = match chat::visible_channel_ids(state, user).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(uid = %user.uid, error = %e, "ws: visible channel lookup failed");
            return Vec::new();
        }
    };

    let mut frames = Vec::new();
    let mut closed = Vec::new();
    for sub in subscriptions.iter() {
        if !sub.touched_by(changed, &visible) {
            continue;
        }
        match snapshot(state, user, sub).await {
            Ok(item) => frames.push(item),
            Err(err) => {
                closed.push(sub.request.id);
                frames.push(err);
            }
        }
    }
    subscriptions.retain(|sub| !closed.contains(&sub.request.id));
    frames
}

// =============================================================================
// SEND
// =============================================================================

async fn send_all(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), ()> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame.data.get("message").and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
