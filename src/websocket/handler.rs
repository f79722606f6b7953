use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::metrics::{ConnectionMetrics, EventMetrics};
use crate::relay::{ClientSession, EventRouter};
use crate::server::AppState;

use super::message::{ClientEvent, OutboundFrame};

/// WebSocket upgrade handler. Connections are anonymous; identity only
/// exists at the event level, once the client sends `login`.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_start = std::time::Instant::now();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(state.settings.websocket.channel_buffer);

    let handle = state.connections.register(tx);
    let connection_id = handle.id;

    ConnectionMetrics::record_opened(state.connections.len());

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending queued frames to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let msg = match frame {
                OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize event");
                        continue;
                    }
                },
                OutboundFrame::Shared(json) => Message::Text(json.as_ref().into()),
                OutboundFrame::Ping => Message::Ping(Bytes::new()),
            };

            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Task for receiving events from the WebSocket. It owns the session
    // state for this connection.
    let router = state.router.clone();
    let mut session = ClientSession::new(handle.clone());
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &router, &mut session).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %session.conn.id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    join_connection_tasks(send_task, recv_task).await;

    // Leave the live set first so the departure fan-out cannot target the
    // closing connection, then clean up whatever it registered.
    state.connections.unregister(connection_id);
    state.router.handle_disconnect(connection_id).await;

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(state.connections.len(), duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Run the connection's task pair until either finishes, then abort the
/// other. A half-closed socket must not keep feeding events to the router
/// once disconnect cleanup has run.
async fn join_connection_tasks(mut send_task: JoinHandle<()>, mut recv_task: JoinHandle<()>) {
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!("Send task completed, stopping receive task");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!("Receive task completed, stopping send task");
            send_task.abort();
        }
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_frame(msg: Message, router: &EventRouter, session: &mut ClientSession) -> bool {
    match msg {
        Message::Text(text) => {
            let event: ClientEvent = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    // Malformed frames are dropped with no reply; the relay
                    // never surfaces validation errors to clients.
                    tracing::debug!(
                        connection_id = %session.conn.id,
                        error = %e,
                        "Dropping malformed frame"
                    );
                    EventMetrics::record_dropped();
                    return true;
                }
            };

            router.handle_event(session, event).await;
            true
        }
        Message::Binary(_) => {
            tracing::debug!(connection_id = %session.conn.id, "Dropping binary frame");
            EventMetrics::record_dropped();
            true
        }
        // Axum replies to pings automatically
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %session.conn.id, "Received close frame");
            false
        }
    }
}
