//! WebSocket handlers, one per device topic: `/senso`, `/flex`, `/rfid`.
//!
//! Each connection gets its own cancellable scope (a child of the root),
//! a fresh bus subscription for its outbound pump, and a single write lock
//! shared between the pump and any command replies so two tasks never
//! interleave partial frames on the same socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bridge_protocol::SensoMessage;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::commands::handle_senso_command;
use crate::state::AppState;

const OUTBOUND_DEADLINE: Duration = Duration::from_millis(50);

pub type WsSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Sends one frame under the shared write lock with a fixed outbound
/// deadline. Returns `false` on timeout or write error — callers treat that
/// as "close the connection".
pub async fn send_frame(sink: &WsSink, message: Message) -> bool {
    let mut guard = sink.lock().await;
    matches!(tokio::time::timeout(OUTBOUND_DEADLINE, guard.send(message)).await, Ok(Ok(())))
}

pub async fn senso_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_senso(socket, state))
}

async fn handle_senso(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let sink: WsSink = Arc::new(Mutex::new(sink));
    let cancel = state.root_cancel.child_token();
    let mut rx = state.bus.subscribe_rx();

    let outbound = {
        let sink = sink.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    received = rx.recv() => match received {
                        Ok(bytes) => {
                            if !send_frame(&sink, Message::Binary(bytes.to_vec().into())).await {
                                cancel.cancel();
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "senso ws outbound lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            cancel.cancel();
                            return;
                        }
                    },
                }
            }
        })
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = stream.next() => match msg {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(Message::Binary(data))) => {
                    state.bus.publish_tx(std::sync::Arc::from(data.as_ref()));
                }
                Some(Ok(Message::Text(text))) => {
                    handle_senso_command(&text, &state, &sink).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = send_frame(&sink, Message::Pong(payload)).await;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    cancel.cancel();
    outbound.abort();
}

pub async fn flex_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_device_stream(socket, state, Topic::Flex))
}

pub async fn rfid_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_device_stream(socket, state, Topic::Rfid))
}

enum Topic {
    Flex,
    Rfid,
}

/// Flex and RFID are outbound-only from the bridge's perspective: inbound
/// frames from the client are read (so pings/closes are handled) but never
/// forwarded anywhere.
async fn handle_device_stream(socket: WebSocket, state: Arc<AppState>, topic: Topic) {
    let (sink, mut stream) = socket.split();
    let sink: WsSink = Arc::new(Mutex::new(sink));
    let cancel = state.root_cancel.child_token();

    let outbound = {
        let sink = sink.clone();
        let cancel = cancel.clone();
        let state = state.clone();
        tokio::spawn(async move {
            match topic {
                Topic::Flex => pump_flex(&sink, &state, &cancel).await,
                Topic::Rfid => pump_rfid(&sink, &state, &cancel).await,
            }
        })
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = stream.next() => match msg {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = send_frame(&sink, Message::Pong(payload)).await;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    cancel.cancel();
    outbound.abort();
}

async fn pump_flex(sink: &WsSink, state: &Arc<AppState>, cancel: &tokio_util::sync::CancellationToken) {
    let mut rx = state.bus.subscribe_flex_rx();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            received = rx.recv() => match received {
                Ok(bytes) => {
                    if !send_frame(sink, Message::Binary(bytes.to_vec().into())).await {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

async fn pump_rfid(sink: &WsSink, state: &Arc<AppState>, cancel: &tokio_util::sync::CancellationToken) {
    let mut rx = state.bus.subscribe_rfid_tokens();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            received = rx.recv() => match received {
                Ok(msg) => {
                    if let Ok(text) = serde_json::to_string(&msg) {
                        if !send_frame(sink, Message::Text(text.into())).await {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// Used by `commands.rs` when a command handler needs to write a
/// `SensoMessage` reply on the same socket the outbound pump uses.
pub async fn send_senso_message(sink: &WsSink, message: &SensoMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => send_frame(sink, Message::Text(text.into())).await,
        Err(_) => false,
    }
}
