use std::{sync::Arc, time::Duration};

use shared::{domain::ParticipantId, protocol::SessionMessage};
use tokio::sync::mpsc;

pub mod config;
pub mod coordinator;
pub mod error;
pub mod runtime;
pub mod transport;

pub use config::{load_settings, DialSpec, ParticipantSettings, PositionSpec, SnapperSpec};
pub use coordinator::{Authority, ControlStatus, Disposition, OwnershipCoordinator};
pub use error::{ConfigError, SessionError};
pub use runtime::{Participant, PointerCommand, SessionEvent};
pub use transport::{LoopbackRelay, RelayConnector, RelayLink, WebSocketConnector};

/// Ordered, best-effort outbound half of the room relay.
pub trait SessionChannel: Send + Sync {
    fn publish(&self, message: SessionMessage) -> Result<(), SessionError>;
}

impl SessionChannel for mpsc::UnboundedSender<SessionMessage> {
    fn publish(&self, message: SessionMessage) -> Result<(), SessionError> {
        self.send(message).map_err(|_| SessionError::Disconnected)
    }
}

/// Per-process session state shared by the router and every coordinator.
pub struct SessionContext {
    local: ParticipantId,
    outbound: Arc<dyn SessionChannel>,
    request_timeout: Duration,
}

impl SessionContext {
    pub fn new(
        local: ParticipantId,
        outbound: Arc<dyn SessionChannel>,
        request_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            outbound,
            request_timeout,
        })
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn publish(&self, message: SessionMessage) -> Result<(), SessionError> {
        self.outbound.publish(message)
    }
}
