use std::{
    collections::HashMap,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::Utc;
use shared::{
    domain::ParticipantId,
    protocol::{Envelope, RelayFrame, SessionMessage},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

struct Room {
    frames: broadcast::Sender<RelayFrame>,
    seq: u64,
    members: u32,
}

impl Room {
    fn announce_presence(&self) {
        let _ = self.frames.send(RelayFrame::Presence {
            participant_count: self.members,
        });
    }
}

/// A member's handle on a room: its id and the room-wide frame stream.
pub struct Membership {
    pub participant_id: ParticipantId,
    pub participant_count: u32,
    pub frames: broadcast::Receiver<RelayFrame>,
}

/// All live rooms. Publishing stamps and sends under the registry lock, so
/// every subscriber of a room observes one sequence order.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Room>>,
    next_participant: AtomicI64,
    capacity: usize,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_participant: AtomicI64::new(0),
            capacity: capacity.max(1),
        }
    }

    pub async fn join(&self, room: &str) -> Membership {
        let participant_id = ParticipantId(self.next_participant.fetch_add(1, Ordering::Relaxed) + 1);
        let mut rooms = self.rooms.lock().await;
        let entry = rooms.entry(room.to_string()).or_insert_with(|| {
            info!(room, "relay: room created");
            let (frames, _) = broadcast::channel(self.capacity);
            Room {
                frames,
                seq: 0,
                members: 0,
            }
        });
        entry.members += 1;
        let frames = entry.frames.subscribe();
        entry.announce_presence();

        Membership {
            participant_id,
            participant_count: entry.members,
            frames,
        }
    }

    /// Stamps `message` with the room's next sequence number and sends it to
    /// every member, the sender included.
    pub async fn publish(
        &self,
        room: &str,
        sender: ParticipantId,
        message: SessionMessage,
    ) -> Option<u64> {
        let mut rooms = self.rooms.lock().await;
        let entry = rooms.get_mut(room)?;
        entry.seq += 1;
        let seq = entry.seq;
        debug!(room, seq, sender = %sender, kind = message.kind(), "relay: message stamped");
        let _ = entry.frames.send(RelayFrame::Message(Envelope {
            seq,
            sender,
            sent_at: Utc::now(),
            message,
        }));
        Some(seq)
    }

    pub async fn leave(&self, room: &str, participant_id: ParticipantId) {
        let mut rooms = self.rooms.lock().await;
        let Some(entry) = rooms.get_mut(room) else {
            return;
        };
        entry.members = entry.members.saturating_sub(1);
        debug!(room, participant_id = %participant_id, members = entry.members, "relay: member left");
        if entry.members == 0 {
            rooms.remove(room);
            info!(room, "relay: room removed");
            return;
        }
        entry.announce_presence();
    }

    pub async fn participant_count(&self, room: &str) -> u32 {
        let rooms = self.rooms.lock().await;
        rooms.get(room).map_or(0, |entry| entry.members)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

#[cfg(test)]
#[path = "tests/rooms_tests.rs"]
mod tests;
