//! WebSocket transport for the signaling relay
//!
//! Frames are JSON text. Each socket is registered with the room hub on
//! upgrade; a writer task drains the connection's outbound queue and sends
//! transport pings, while the reader feeds text frames to the message
//! handler. Whichever side finishes first ends the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, stream::SplitStream, SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use roomgrid_cluster::sync::{EventReceiver, MessageHandler, SignalingEvent};
use roomgrid_core::models::ConnectionId;

use super::SignalingState;

/// GET /signaling
pub async fn signaling_handler(
    State(state): State<SignalingState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SignalingState) {
    let (conn_id, events) = state.handler.hub().connect();
    info!(connection_id = %conn_id, "WebSocket connection established");

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, events, state.ping_interval, conn_id.clone()));

    tokio::select! {
        _ = &mut writer => {}
        () = read_loop(stream, &state.handler, &conn_id) => {
            writer.abort();
        }
    }

    state.handler.hub().disconnect(&conn_id);
    info!(connection_id = %conn_id, "WebSocket connection closed");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut events: EventReceiver,
    ping_interval: Duration,
    conn_id: ConnectionId,
) {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // The hub dropped this connection
                    debug!(connection_id = %conn_id, "Outbound queue closed, closing socket");
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        error!(connection_id = %conn_id, error = %e, "Failed to encode signaling event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(connection_id = %conn_id, error = %e, "Failed to send WebSocket message");
                    return;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn read_loop(mut stream: SplitStream<WebSocket>, handler: &MessageHandler, conn_id: &ConnectionId) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handler.handle_text(conn_id, text.as_str()),
            Ok(Message::Binary(_)) => {
                handler.hub().touch(conn_id);
                handler
                    .hub()
                    .send_to(conn_id, SignalingEvent::error("Binary frames are not supported"));
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => handler.hub().touch(conn_id),
            Ok(Message::Close(_)) => return,
            Err(e) => {
                debug!(connection_id = %conn_id, error = %e, "WebSocket receive failed");
                return;
            }
        }
    }
}
