use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::ParticipantId,
    protocol::{Envelope, RelayFrame, SessionMessage},
};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SessionError;

pub const LOOPBACK_REGION: &str = "local";

/// A joined room: the welcome details plus both halves of the link.
#[derive(Debug)]
pub struct RelayLink {
    pub participant_id: ParticipantId,
    pub room: String,
    pub region: String,
    pub participant_count: u32,
    pub outbound: mpsc::UnboundedSender<SessionMessage>,
    pub inbound: mpsc::UnboundedReceiver<RelayFrame>,
}

#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Joins `room`, creating it if it does not exist yet.
    async fn join(&self, room: &str, nickname: &str) -> Result<RelayLink, SessionError>;
}

async fn await_welcome(
    outbound: mpsc::UnboundedSender<SessionMessage>,
    mut inbound: mpsc::UnboundedReceiver<RelayFrame>,
) -> Result<RelayLink, SessionError> {
    while let Some(frame) = inbound.recv().await {
        match frame {
            RelayFrame::Welcome {
                participant_id,
                room,
                region,
                participant_count,
            } => {
                info!(
                    participant_id = %participant_id,
                    room = %room,
                    region = %region,
                    participant_count,
                    "transport: joined room"
                );
                return Ok(RelayLink {
                    participant_id,
                    room,
                    region,
                    participant_count,
                    outbound,
                    inbound,
                });
            }
            RelayFrame::Error(err) => return Err(SessionError::Relay(err)),
            other => debug!(?other, "transport: frame before welcome ignored"),
        }
    }
    Err(SessionError::MissingWelcome)
}

pub struct WebSocketConnector {
    server_url: String,
}

impl WebSocketConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    pub fn room_url(&self, room: &str, nickname: &str) -> Result<Url, SessionError> {
        let invalid = |reason: &str| SessionError::InvalidUrl {
            url: self.server_url.clone(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(&self.server_url).map_err(|err| invalid(&err.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return Err(invalid("server_url must start with http://, https://, ws:// or wss://")),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid("cannot switch to a websocket scheme"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("server_url cannot be a base"))?;
            segments.pop_if_empty().extend(["rooms", room, "ws"]);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("nickname", nickname);
        Ok(url)
    }
}

#[async_trait]
impl RelayConnector for WebSocketConnector {
    async fn join(&self, room: &str, nickname: &str) -> Result<RelayLink, SessionError> {
        let url = self.room_url(room, nickname)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| SessionError::Connect {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        let (mut writer, mut reader) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SessionMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<RelayFrame>();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, kind = message.kind(), "transport: failed to encode message");
                        continue;
                    }
                };
                if let Err(err) = writer.send(Message::Text(text)).await {
                    warn!(error = %err, "transport: websocket send failed");
                    break;
                }
            }
            let _ = writer.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RelayFrame>(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "transport: invalid relay frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "transport: websocket receive failed");
                        break;
                    }
                }
            }
            debug!("transport: relay reader finished");
        });

        await_welcome(outbound_tx, inbound_rx).await
    }
}

#[derive(Default)]
struct LoopbackRoom {
    seq: u64,
    members: Vec<(ParticipantId, mpsc::UnboundedSender<RelayFrame>)>,
}

impl LoopbackRoom {
    fn send_all(&mut self, frame: &RelayFrame) {
        self.members
            .retain(|(_, member)| member.send(frame.clone()).is_ok());
    }

    fn count(&self) -> u32 {
        self.members.len() as u32
    }
}

#[derive(Default)]
struct LoopbackState {
    next_participant: i64,
    rooms: HashMap<String, LoopbackRoom>,
}

/// In-process relay with the same ordering guarantees as the real one: a
/// single lock serialises every publish, and every member (the sender
/// included) sees the stamped envelope in that order.
#[derive(Clone, Default)]
pub struct LoopbackRelay {
    inner: Arc<Mutex<LoopbackState>>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn participant_count(&self, room: &str) -> u32 {
        let state = self.inner.lock().await;
        state.rooms.get(room).map_or(0, LoopbackRoom::count)
    }

    /// Drops every member link of `room`; their sessions see a disconnect.
    pub async fn close_room(&self, room: &str) {
        let mut state = self.inner.lock().await;
        if state.rooms.remove(room).is_some() {
            info!(room, "transport: loopback room closed");
        }
    }

    async fn publish(&self, room: &str, sender: ParticipantId, message: SessionMessage) {
        let mut state = self.inner.lock().await;
        let Some(room_state) = state.rooms.get_mut(room) else {
            return;
        };
        room_state.seq += 1;
        let frame = RelayFrame::Message(Envelope {
            seq: room_state.seq,
            sender,
            sent_at: Utc::now(),
            message,
        });
        room_state.send_all(&frame);
    }

    async fn leave(&self, room: &str, participant_id: ParticipantId) {
        let mut state = self.inner.lock().await;
        let Some(room_state) = state.rooms.get_mut(room) else {
            return;
        };
        room_state.members.retain(|(id, _)| *id != participant_id);
        if room_state.members.is_empty() {
            state.rooms.remove(room);
            return;
        }
        let count = room_state.count();
        room_state.send_all(&RelayFrame::Presence {
            participant_count: count,
        });
    }
}

#[async_trait]
impl RelayConnector for LoopbackRelay {
    async fn join(&self, room: &str, _nickname: &str) -> Result<RelayLink, SessionError> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        let participant_id = {
            let mut state = self.inner.lock().await;
            state.next_participant += 1;
            let participant_id = ParticipantId(state.next_participant);
            let room_state = state.rooms.entry(room.to_string()).or_default();
            room_state.members.push((participant_id, inbound_tx.clone()));
            let participant_count = room_state.count();
            let _ = inbound_tx.send(RelayFrame::Welcome {
                participant_id,
                room: room.to_string(),
                region: LOOPBACK_REGION.to_string(),
                participant_count,
            });
            room_state.send_all(&RelayFrame::Presence { participant_count });
            participant_id
        };

        let relay = self.clone();
        let room_name = room.to_string();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                relay.publish(&room_name, participant_id, message).await;
            }
            relay.leave(&room_name, participant_id).await;
        });

        await_welcome(outbound_tx, inbound_rx).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
