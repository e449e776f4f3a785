//! WebSocket transport for the connection pool.
//!
//! `GET /ws/{id}` upgrades to a socket that joins the pool listening to
//! `id`. Text frames from the client are forwarded into the pool; pool
//! messages matching `id` are written back as text frames.

use std::time::Duration;

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use ordercast_core::events::{OrderEvent, PublishError, TargetId};
use ordercast_core::processors::{ConnectionPool, InboundSender, PoolConnection};
use ordercast_sdk::objects::SocketInbound;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{id}", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let target = TargetId::parse(&id);
    ws.on_upgrade(move |socket| run_socket_session(socket, state.pool, target))
}

/// Serve one socket from upgrade through disconnect.
///
/// A writer task drains the connection's outbound channel and pings the
/// client; a reader task forwards client frames into the pool. Whichever
/// finishes first ends the session and the other is aborted.
async fn run_socket_session(socket: WebSocket, pool: ConnectionPool, target: TargetId) {
    let PoolConnection {
        guard,
        mut outbound,
        inbound,
    } = match pool.connect(target) {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e, "Connection pool unavailable, closing socket");
            return;
        }
    };
    let connection_id = guard.id();
    info!(
        connection_id = %connection_id,
        target_id = %guard.target(),
        "Socket connected"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                message = outbound.recv() => {
                    match message {
                        Some(event) => {
                            let frame = Message::Text(event.payload().to_owned().into());
                            if ws_tx.send(frame).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return;
                    }
                }
            }
        }

        // Dropped by the pool: tell the client instead of going silent.
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            match message {
                Message::Text(text) => match forward_inbound(&inbound, text.as_str()).await {
                    Ok(()) => {}
                    Err(PublishError::QueueFull) => {
                        warn!("Connection pool queue full, inbound frame dropped");
                    }
                    Err(PublishError::Closed) => break,
                },
                Message::Binary(data) => {
                    debug!(len = data.len(), "Ignoring binary frame");
                }
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    drop(guard);
    info!(connection_id = %connection_id, "Socket disconnected");
}

/// Turn one client text frame into a pool message.
///
/// Frames shaped as [`SocketInbound`] are routed by their `target`; any
/// other text is broadcast verbatim.
async fn forward_inbound(
    inbound: &InboundSender,
    text: &str,
) -> Result<(), PublishError> {
    inbound.send(inbound_event(text)).await
}

fn inbound_event(text: &str) -> OrderEvent {
    match serde_json::from_str::<SocketInbound>(text) {
        Ok(message) => match message.target.as_deref() {
            Some(target) => OrderEvent::targeted(target, message.payload_text()),
            None => OrderEvent::broadcast(message.payload_text()),
        },
        Err(_) => OrderEvent::broadcast(text),
    }
}
