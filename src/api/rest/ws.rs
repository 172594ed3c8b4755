use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chat::relay::parse_order_id;
use crate::chat::room::Frame;
use crate::error::AppError;
use crate::state::AppState;

pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Path(order_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let order_id = parse_order_id(&order_id)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, order_id, state)))
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
    }
}

async fn handle_socket(socket: WebSocket, order_id: u64, state: Arc<AppState>) {
    let (member, mut outbound) = state.rooms.join(order_id).into_parts();
    let member_id = member.id();
    let (mut sender, mut receiver) = socket.split();
    let write_timeout = state.ws_write_timeout;

    info!(order_id, member_id = %member_id, "chat connection open");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match timeout(write_timeout, sender.send(to_message(frame))).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(order_id, member_id = %member_id, error = %err, "chat write failed");
                    break;
                }
                Err(_) => {
                    warn!(order_id, member_id = %member_id, "chat write timed out");
                    break;
                }
            }
        }
        let _ = sender.close().await;
    });

    // The member guard lives in the reader: once reading stops, the
    // connection leaves the room before any later broadcast.
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            let frame = match result {
                Ok(Message::Text(text)) => Frame::Text(text),
                Ok(Message::Binary(bytes)) => Frame::Binary(bytes),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    warn!(order_id, member_id = %member.id(), error = %err, "chat read failed");
                    break;
                }
            };

            let delivered = member.broadcast(frame);
            debug!(order_id, delivered, "chat frame relayed");
        }
        drop(member);
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(order_id, member_id = %member_id, "chat connection closed");
}
