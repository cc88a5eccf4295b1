use crate::relay::Disposition;
use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one signaling connection.
///
/// Inbound frames are handled one at a time, in arrival order, on this
/// task. Outbound frames go through an unbounded channel drained by a
/// separate writer task, so routing never waits on a slow peer.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for outbound messages
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let client_id = match state.relay.register(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Rejecting WebSocket connection: {}", e);
            // Only non-empty when error replies are enabled
            while let Ok(frame) = rx.try_recv() {
                let _ = sender.send(Message::Text(frame.into())).await;
            }
            return;
        }
    };

    // Spawn task to forward messages from channel to WebSocket
    let writer_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sender.send(Message::Text(frame.into())).await {
                tracing::debug!("Send to {} failed: {}", writer_id, e);
                break;
            }
        }
    });

    let mut disposition = Disposition::Continue;

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                disposition = state.relay.handle_message(&client_id, text.as_str()).await;
                if disposition == Disposition::Terminate {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!("Ignoring binary frame from {}", client_id);
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("WebSocket error for {}: {}", client_id, e);
                break;
            }
            // Ping/pong are answered by axum
            _ => {}
        }

        if send_task.is_finished() {
            break;
        }
    }

    // Cleanup on disconnect
    state.relay.unregister(&client_id).await;

    // Abort the send task
    send_task.abort();

    if disposition == Disposition::Terminate {
        // Wait for the writer half to drop so the socket closes now,
        // without a close frame
        let _ = (&mut send_task).await;
        tracing::info!("Terminated connection {}", client_id);
    }
}
