use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ControlId, ControlValue, Epoch, ParticipantId},
    error::ApiError,
};

/// Messages a participant publishes on the room relay.
///
/// Every variant carries the authority epoch the sender based it on. Receivers
/// discard anything whose epoch no longer matches their view of the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionMessage {
    RequestOwnership {
        control_id: ControlId,
        participant_id: ParticipantId,
        epoch: Epoch,
    },
    GrantOwnership {
        control_id: ControlId,
        participant_id: ParticipantId,
        epoch: Epoch,
    },
    SetInteractable {
        control_id: ControlId,
        interactable: bool,
        epoch: Epoch,
    },
    ValueUpdate {
        control_id: ControlId,
        value: ControlValue,
        epoch: Epoch,
    },
    FullStateSnapshot {
        control_id: ControlId,
        value: ControlValue,
        epoch: Epoch,
        owner: ParticipantId,
        owner_interacting: bool,
    },
}

impl SessionMessage {
    pub fn control_id(&self) -> &ControlId {
        match self {
            SessionMessage::RequestOwnership { control_id, .. }
            | SessionMessage::GrantOwnership { control_id, .. }
            | SessionMessage::SetInteractable { control_id, .. }
            | SessionMessage::ValueUpdate { control_id, .. }
            | SessionMessage::FullStateSnapshot { control_id, .. } => control_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::RequestOwnership { .. } => "request_ownership",
            SessionMessage::GrantOwnership { .. } => "grant_ownership",
            SessionMessage::SetInteractable { .. } => "set_interactable",
            SessionMessage::ValueUpdate { .. } => "value_update",
            SessionMessage::FullStateSnapshot { .. } => "full_state_snapshot",
        }
    }
}

/// A message as stamped by the relay. `seq` is strictly increasing per room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub sender: ParticipantId,
    pub sent_at: DateTime<Utc>,
    pub message: SessionMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RelayFrame {
    Welcome {
        participant_id: ParticipantId,
        room: String,
        region: String,
        participant_count: u32,
    },
    Message(Envelope),
    Presence {
        participant_count: u32,
    },
    Error(ApiError),
}
