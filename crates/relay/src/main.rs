use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::stream::SplitSink;
use serde::Deserialize;
use shared::{
    domain::ParticipantId,
    error::{ApiError, ErrorCode},
    protocol::{RelayFrame, SessionMessage},
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod rooms;

use config::{load_settings, RelaySettings};
use rooms::RoomRegistry;

const MAX_ROOM_NAME_BYTES: usize = 64;

struct AppState {
    rooms: RoomRegistry,
    region: String,
}

#[derive(Debug, Deserialize)]
struct JoinQuery {
    nickname: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let app = build_router(app_state(&settings));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, region = %settings.region, "relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn app_state(settings: &RelaySettings) -> Arc<AppState> {
    Arc::new(AppState {
        rooms: RoomRegistry::new(settings.broadcast_capacity),
        region: settings.region.clone(),
    })
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/rooms/:room/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
    Query(q): Query<JoinQuery>,
) -> Response {
    let room = room.trim().to_string();
    if room.is_empty() || room.len() > MAX_ROOM_NAME_BYTES {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                format!("room name must be 1 to {MAX_ROOM_NAME_BYTES} bytes"),
            )),
        )
            .into_response();
    }
    let nickname = q.nickname.unwrap_or_default();
    ws.on_upgrade(move |socket| ws_connection(state, socket, room, nickname))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, room: String, nickname: String) {
    use futures::{SinkExt, StreamExt};

    let membership = state.rooms.join(&room).await;
    let participant_id = membership.participant_id;
    info!(
        room = %room,
        participant_id = %participant_id,
        nickname = %nickname,
        participant_count = membership.participant_count,
        "relay: participant joined"
    );

    let (mut sender, mut receiver) = socket.split();
    let welcome = RelayFrame::Welcome {
        participant_id,
        room: room.clone(),
        region: state.region.clone(),
        participant_count: membership.participant_count,
    };
    let welcomed = match serde_json::to_string(&welcome) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(_) => false,
    };

    if welcomed {
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let send_task = tokio::spawn(forward_frames(
            sender,
            direct_rx,
            membership.frames,
            participant_id,
        ));

        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match serde_json::from_str::<SessionMessage>(&text) {
                Ok(message) => {
                    state.rooms.publish(&room, participant_id, message).await;
                }
                Err(error) => {
                    warn!(participant_id = %participant_id, %error, "relay: malformed client frame");
                    let _ = direct_tx.send(RelayFrame::Error(ApiError::new(
                        ErrorCode::Validation,
                        format!("malformed message: {error}"),
                    )));
                }
            }
        }

        send_task.abort();
    }

    state.rooms.leave(&room, participant_id).await;
    info!(room = %room, participant_id = %participant_id, "relay: participant left");
}

/// Writes room frames and frames addressed to this member alone to the
/// socket. A member that falls behind the room loses the skipped frames.
async fn forward_frames(
    mut sender: SplitSink<WebSocket, Message>,
    direct: mpsc::UnboundedReceiver<RelayFrame>,
    room: broadcast::Receiver<RelayFrame>,
    participant_id: ParticipantId,
) {
    use futures::SinkExt;
    use tokio_stream::{
        wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, UnboundedReceiverStream},
        StreamExt,
    };

    let direct = UnboundedReceiverStream::new(direct).map(Ok);
    let mut frames = direct.merge(BroadcastStream::new(room));

    while let Some(item) = frames.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(participant_id = %participant_id, skipped, "relay: member lagging, frames dropped");
                continue;
            }
        };
        let text = match serde_json::to_string(&frame) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    debug!(participant_id = %participant_id, "relay: frame forwarding finished");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
