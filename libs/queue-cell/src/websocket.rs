use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::router::QueueState;

/// Realtime feed for a queue. Unknown queues are rejected before the upgrade.
pub async fn queue_live(
    ws: WebSocketUpgrade,
    State(state): State<QueueState>,
    Path(queue_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.queues.get_queue(queue_id).await?;

    info!("Realtime subscriber connecting to queue {}", queue_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, queue_id)))
}

async fn handle_socket(socket: WebSocket, state: QueueState, queue_id: Uuid) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the snapshot so no event falls between the two
    let mut events = state.queues.hub().subscribe(queue_id).await;

    if !send_snapshot(&state, queue_id, &mut sink).await {
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(message) => {
                        if sink.send(Message::Text(message.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Subscriber of queue {} lagged by {} event(s), resending snapshot", queue_id, skipped);
                        if !send_snapshot(&state, queue_id, &mut sink).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    let _ = sink.close().await;
    debug!("Realtime subscriber left queue {}", queue_id);
}

async fn send_snapshot<S>(state: &QueueState, queue_id: Uuid, sink: &mut S) -> bool
where
    S: Sink<Message> + Unpin,
{
    let snapshot = match state.queues.snapshot(queue_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!("No snapshot for queue {}: {}", queue_id, e);
            return false;
        }
    };

    match serde_json::to_string(&snapshot) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize snapshot for queue {}: {}", queue_id, e);
            false
        }
    }
}
