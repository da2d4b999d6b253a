use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Instant,
};

use controls::{InteractionRouter, PointerSample, RoutedInput};
use serde::Serialize;
use shared::{
    domain::{ConnectionState, ControlId, ParticipantId, RoomStatus},
    protocol::RelayFrame,
};
use tokio::{
    sync::{broadcast, mpsc},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::ParticipantSettings,
    coordinator::{ControlStatus, OwnershipCoordinator},
    error::SessionError,
    transport::RelayLink,
    SessionContext,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PointerCommand {
    Press(PointerSample),
    Move(PointerSample),
    Release,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    Status(RoomStatus),
    Control(ControlStatus),
    Error(String),
}

/// One participant's view of the room: the pointer router, a coordinator per
/// dial and the room status, all driven from a single task.
pub struct Participant {
    ctx: Arc<SessionContext>,
    settings: ParticipantSettings,
    router: InteractionRouter,
    coordinators: BTreeMap<ControlId, OwnershipCoordinator>,
    published: HashMap<ControlId, ControlStatus>,
    status: RoomStatus,
    events: broadcast::Sender<SessionEvent>,
    inbound: mpsc::UnboundedReceiver<RelayFrame>,
}

impl Participant {
    pub fn new(settings: ParticipantSettings, link: RelayLink) -> Self {
        let RelayLink {
            participant_id,
            room,
            region,
            participant_count,
            outbound,
            inbound,
        } = link;

        let ctx = SessionContext::new(participant_id, Arc::new(outbound), settings.request_timeout());
        let now = Instant::now();
        let coordinators = settings
            .valid_dials()
            .into_iter()
            .map(|spec| {
                let dial = spec.build(now);
                (
                    dial.id().clone(),
                    OwnershipCoordinator::new(Arc::clone(&ctx), dial),
                )
            })
            .collect();
        let (events, _) = broadcast::channel(256);

        Self {
            ctx,
            settings,
            router: InteractionRouter::new(),
            coordinators,
            published: HashMap::new(),
            status: RoomStatus {
                connection: ConnectionState::Joined,
                room: Some(room),
                region: Some(region),
                participant_count,
            },
            events,
            inbound,
        }
    }

    pub fn local(&self) -> ParticipantId {
        self.ctx.local()
    }

    pub fn status(&self) -> &RoomStatus {
        &self.status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn control(&self, control_id: &ControlId) -> Option<&OwnershipCoordinator> {
        self.coordinators.get(control_id)
    }

    pub fn control_ids(&self) -> impl Iterator<Item = &ControlId> {
        self.coordinators.keys()
    }

    pub fn apply_pointer(&mut self, command: PointerCommand, now: Instant) -> Result<(), SessionError> {
        let routed = match command {
            PointerCommand::Press(sample) => self.router.press(sample),
            PointerCommand::Move(sample) => self.router.drag(sample),
            PointerCommand::Release => self.router.release(),
        };
        let Some(routed) = routed else {
            return Ok(());
        };

        let Some(coordinator) = self.coordinators.get_mut(routed.control_id()) else {
            match &routed {
                // Moves over foreign or decorative hits arrive every frame.
                RoutedInput::Update { control_id, .. } => debug!(
                    control_id = %control_id,
                    "session: pointer moved over an unknown control"
                ),
                RoutedInput::Begin { control_id, .. } | RoutedInput::End { control_id } => warn!(
                    control_id = %control_id,
                    "session: pointer routed to an unknown control"
                ),
            }
            self.router.forget(routed.control_id());
            return Ok(());
        };
        match routed {
            RoutedInput::Begin { position, .. } => {
                coordinator.begin_interaction(position, now)?;
            }
            RoutedInput::Update { position, .. } => coordinator.update_interaction(position, now)?,
            RoutedInput::End { .. } => coordinator.end_interaction(now)?,
        }

        self.publish_changes();
        Ok(())
    }

    pub fn handle_frame(&mut self, frame: RelayFrame, now: Instant) -> Result<(), SessionError> {
        match frame {
            RelayFrame::Message(envelope) => {
                match self.coordinators.get_mut(envelope.message.control_id()) {
                    Some(coordinator) => {
                        let disposition = coordinator.handle(&envelope, now)?;
                        trace!(
                            seq = envelope.seq,
                            kind = envelope.message.kind(),
                            ?disposition,
                            "session: relay message handled"
                        );
                    }
                    None => debug!(
                        control_id = %envelope.message.control_id(),
                        "session: message for an unknown control"
                    ),
                }
            }
            RelayFrame::Presence { participant_count } => {
                self.status.participant_count = participant_count;
                let _ = self.events.send(SessionEvent::Status(self.status.clone()));
            }
            RelayFrame::Welcome { .. } => debug!("session: ignoring repeated welcome"),
            RelayFrame::Error(err) => {
                warn!(code = ?err.code, message = %err.message, "session: relay reported an error");
                let _ = self.events.send(SessionEvent::Error(err.message));
            }
        }

        self.publish_changes();
        Ok(())
    }

    /// Frame tick: snap animations, momentary returns and request timeouts.
    pub fn tick(&mut self, now: Instant) -> Result<(), SessionError> {
        for coordinator in self.coordinators.values_mut() {
            coordinator.poll(now)?;
        }
        self.publish_changes();
        Ok(())
    }

    pub fn broadcast_full_state(&self) -> Result<(), SessionError> {
        for coordinator in self.coordinators.values() {
            if let Some(message) = coordinator.full_state() {
                self.ctx.publish(message)?;
            }
        }
        Ok(())
    }

    fn publish_changes(&mut self) {
        for coordinator in self.coordinators.values() {
            let status = coordinator.status();
            if self.published.get(&status.control_id) == Some(&status) {
                continue;
            }
            self.published
                .insert(status.control_id.clone(), status.clone());
            let _ = self.events.send(SessionEvent::Control(status));
        }
    }

    /// Runs until `input` closes (a clean leave) or the relay link drops,
    /// which is fatal.
    pub async fn run(mut self, mut input: mpsc::Receiver<PointerCommand>) -> Result<(), SessionError> {
        let mut frame_tick = interval(self.settings.frame_interval());
        frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut full_state_tick = interval(self.settings.full_state_interval());
        full_state_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            participant_id = %self.local(),
            room = ?self.status.room,
            controls = self.coordinators.len(),
            "session: running"
        );
        let _ = self.events.send(SessionEvent::Status(self.status.clone()));
        self.publish_changes();

        loop {
            tokio::select! {
                frame = self.inbound.recv() => match frame {
                    Some(frame) => self.handle_frame(frame, Instant::now())?,
                    None => {
                        error!(participant_id = %self.local(), "session: relay link closed");
                        self.status.connection = ConnectionState::Disconnected;
                        let _ = self.events.send(SessionEvent::Status(self.status.clone()));
                        return Err(SessionError::Disconnected);
                    }
                },
                command = input.recv() => match command {
                    Some(command) => self.apply_pointer(command, Instant::now())?,
                    None => {
                        info!(participant_id = %self.local(), "session: input closed, leaving room");
                        return Ok(());
                    }
                },
                _ = frame_tick.tick() => self.tick(Instant::now())?,
                _ = full_state_tick.tick() => self.broadcast_full_state()?,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
