use std::{sync::Arc, time::Instant};

use controls::DialControl;
use serde::Serialize;
use shared::{
    domain::{ControlId, ControlValue, Epoch, ParticipantId, Vec2},
    protocol::{Envelope, SessionMessage},
};
use tracing::{debug, info, warn};

use crate::{error::SessionError, SessionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Authority {
    Free,
    Owned(ParticipantId),
    /// The local participant asked `owner` for the control and is waiting for
    /// a grant. Reverts to `Owned(owner)` when the request times out.
    PendingRequest {
        requester: ParticipantId,
        owner: ParticipantId,
    },
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Based on an epoch this participant has already moved past.
    Stale,
    /// Addressed to someone else, an echo of our own message, or a request
    /// that was denied.
    Ignored,
    /// Sent by a participant without authority, or carrying a value this
    /// control cannot use.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlStatus {
    pub control_id: ControlId,
    pub authority: Authority,
    pub epoch: Epoch,
    pub interacting: bool,
    pub interactable: bool,
    pub angle: f32,
    pub output: i32,
}

/// Optimistic single-writer authority for one control.
///
/// There is no consensus round. Correctness relies on every participant
/// observing the relay's messages in one global order, including echoes of
/// its own messages. Each message carries the epoch it was based on; a grant
/// or claim is applied only at the current epoch and bumps it, so of two
/// concurrent claims the one ordered first wins everywhere and the other is
/// discarded as stale everywhere. A second relay, or a relay that reorders,
/// breaks this.
pub struct OwnershipCoordinator {
    ctx: Arc<SessionContext>,
    dial: DialControl,
    authority: Authority,
    /// Owner as of the last applied epoch. Differs from `authority` while a
    /// local claim, request or grant is in flight.
    confirmed_owner: Option<ParticipantId>,
    epoch: Epoch,
    held: bool,
    pending_claim: Option<PendingClaim>,
    request_deadline: Option<Instant>,
}

/// A claim whose own echo has not come back yet.
#[derive(Debug, Clone, Copy)]
struct PendingClaim {
    epoch: Epoch,
    resend_at: Instant,
}

impl OwnershipCoordinator {
    pub fn new(ctx: Arc<SessionContext>, dial: DialControl) -> Self {
        Self {
            ctx,
            dial,
            authority: Authority::Free,
            confirmed_owner: None,
            epoch: Epoch::INITIAL,
            held: false,
            pending_claim: None,
            request_deadline: None,
        }
    }

    pub fn control_id(&self) -> &ControlId {
        self.dial.id()
    }

    pub fn dial(&self) -> &DialControl {
        &self.dial
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_interacting(&self) -> bool {
        self.dial.is_interacting()
    }

    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            control_id: self.dial.id().clone(),
            authority: self.authority,
            epoch: self.epoch,
            interacting: self.dial.is_interacting(),
            interactable: self.dial.is_interactable(),
            angle: self.dial.angle(),
            output: self.dial.output(),
        }
    }

    fn local(&self) -> ParticipantId {
        self.ctx.local()
    }

    fn is_confirmed_owner(&self) -> bool {
        let local = self.local();
        self.authority == Authority::Owned(local) && self.confirmed_owner == Some(local)
    }

    /// Press on the dial. Returns false when the dial refused the grab.
    pub fn begin_interaction(&mut self, pointer: Vec2, now: Instant) -> Result<bool, SessionError> {
        if self.dial.begin_interaction(pointer, now).is_none() {
            return Ok(false);
        }
        self.held = true;

        if self.is_confirmed_owner() {
            self.dial.set_interacting(true);
            debug!(
                control_id = %self.control_id(),
                epoch = %self.epoch,
                "ownership: owner resumed interaction"
            );
            self.publish(SessionMessage::SetInteractable {
                control_id: self.control_id().clone(),
                interactable: false,
                epoch: self.epoch,
            })?;
            return Ok(true);
        }

        self.request_ownership(now)?;
        Ok(true)
    }

    /// Claims a free control optimistically, or asks the current owner for it.
    /// Local authority is only taken once the claim or grant comes back
    /// through the relay.
    pub fn request_ownership(&mut self, now: Instant) -> Result<(), SessionError> {
        let local = self.local();
        match self.authority {
            Authority::Free => {
                info!(
                    control_id = %self.control_id(),
                    participant_id = %local,
                    epoch = %self.epoch,
                    "ownership: claiming free control"
                );
                self.authority = Authority::Owned(local);
                self.pending_claim = Some(PendingClaim {
                    epoch: self.epoch,
                    resend_at: now + self.ctx.request_timeout(),
                });
                self.publish(SessionMessage::GrantOwnership {
                    control_id: self.control_id().clone(),
                    participant_id: local,
                    epoch: self.epoch,
                })
            }
            Authority::Owned(owner) if owner != local => {
                info!(
                    control_id = %self.control_id(),
                    participant_id = %local,
                    owner = %owner,
                    epoch = %self.epoch,
                    "ownership: requesting control from owner"
                );
                self.authority = Authority::PendingRequest {
                    requester: local,
                    owner,
                };
                self.request_deadline = Some(now + self.ctx.request_timeout());
                self.publish(SessionMessage::RequestOwnership {
                    control_id: self.control_id().clone(),
                    participant_id: local,
                    epoch: self.epoch,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn update_interaction(&mut self, pointer: Vec2, now: Instant) -> Result<(), SessionError> {
        if self.dial.update_interaction(pointer, now).is_some() {
            self.flush_value()?;
        }
        Ok(())
    }

    pub fn end_interaction(&mut self, now: Instant) -> Result<(), SessionError> {
        self.held = false;
        if self.dial.end_interaction(now).is_none() {
            return Ok(());
        }

        // The settled value goes out before others are allowed to claim.
        self.flush_value()?;
        debug!(
            control_id = %self.control_id(),
            epoch = %self.epoch,
            "ownership: interaction ended, reopening control"
        );
        self.publish(SessionMessage::SetInteractable {
            control_id: self.control_id().clone(),
            interactable: true,
            epoch: self.epoch,
        })
    }

    pub fn handle(&mut self, envelope: &Envelope, now: Instant) -> Result<Disposition, SessionError> {
        if envelope.message.control_id() != self.control_id() {
            return Ok(Disposition::Ignored);
        }

        let sender = envelope.sender;
        let disposition = match &envelope.message {
            SessionMessage::RequestOwnership {
                participant_id,
                epoch,
                ..
            } => self.on_request(sender, *participant_id, *epoch, now)?,
            SessionMessage::GrantOwnership {
                participant_id,
                epoch,
                ..
            } => self.on_grant(sender, *participant_id, *epoch, now)?,
            SessionMessage::SetInteractable {
                interactable,
                epoch,
                ..
            } => self.on_set_interactable(sender, *interactable, *epoch, now),
            SessionMessage::ValueUpdate { value, epoch, .. } => {
                self.on_value(sender, value, *epoch, now)
            }
            SessionMessage::FullStateSnapshot {
                value,
                epoch,
                owner,
                owner_interacting,
                ..
            } => self.on_snapshot(sender, value, *epoch, *owner, *owner_interacting, now),
        };

        if disposition == Disposition::Stale {
            debug!(
                control_id = %self.control_id(),
                kind = envelope.message.kind(),
                seq = envelope.seq,
                sender = %sender,
                epoch = %self.epoch,
                "ownership: discarding stale message"
            );
        }
        Ok(disposition)
    }

    /// Advances animations and expires an unanswered request.
    pub fn poll(&mut self, now: Instant) -> Result<(), SessionError> {
        if let Authority::PendingRequest { owner, .. } = self.authority {
            if self.request_deadline.is_some_and(|deadline| now >= deadline) {
                info!(
                    control_id = %self.control_id(),
                    owner = %owner,
                    "ownership: request timed out, reverting to owner"
                );
                self.authority = Authority::Owned(owner);
                self.request_deadline = None;
            }
        }

        if let Some(claim) = self.pending_claim {
            if now >= claim.resend_at {
                self.resolve_missing_claim_echo(claim, now)?;
            }
        }

        self.dial.tick(now);
        self.flush_value()
    }

    /// The relay dropped the echo of our claim. While the epoch has not moved
    /// the claim is re-sent: whoever already applied it discards the copy as
    /// stale, and our own copy confirms it. Once the epoch has moved the claim
    /// lost.
    fn resolve_missing_claim_echo(
        &mut self,
        claim: PendingClaim,
        now: Instant,
    ) -> Result<(), SessionError> {
        if claim.epoch != self.epoch {
            self.pending_claim = None;
            info!(
                control_id = %self.control_id(),
                epoch = %claim.epoch,
                "ownership: unconfirmed claim overtaken, dropping it"
            );
            if self.held {
                self.request_ownership(now)?;
            }
            return Ok(());
        }

        let local = self.local();
        info!(
            control_id = %self.control_id(),
            participant_id = %local,
            epoch = %self.epoch,
            "ownership: claim echo missing, re-sending claim"
        );
        self.pending_claim = Some(PendingClaim {
            resend_at: now + self.ctx.request_timeout(),
            ..claim
        });
        self.publish(SessionMessage::GrantOwnership {
            control_id: self.control_id().clone(),
            participant_id: local,
            epoch: self.epoch,
        })
    }

    /// Periodic full state, produced only by the confirmed owner.
    pub fn full_state(&self) -> Option<SessionMessage> {
        self.is_confirmed_owner()
            .then(|| SessionMessage::FullStateSnapshot {
                control_id: self.control_id().clone(),
                value: self.dial.value(),
                epoch: self.epoch,
                owner: self.local(),
                owner_interacting: self.dial.is_interacting(),
            })
    }

    fn on_request(
        &mut self,
        sender: ParticipantId,
        requester: ParticipantId,
        epoch: Epoch,
        now: Instant,
    ) -> Result<Disposition, SessionError> {
        if sender != requester {
            return Ok(Disposition::Rejected);
        }
        if requester == self.local() {
            return Ok(Disposition::Ignored);
        }
        if epoch != self.epoch {
            return Ok(Disposition::Stale);
        }
        if !self.is_confirmed_owner() {
            return Ok(Disposition::Ignored);
        }
        if self.dial.is_interacting() {
            info!(
                control_id = %self.control_id(),
                requester = %requester,
                "ownership: denying request while interacting"
            );
            return Ok(Disposition::Ignored);
        }

        info!(
            control_id = %self.control_id(),
            requester = %requester,
            epoch = %self.epoch,
            "ownership: granting control"
        );
        self.dial.set_local_authority(false);
        self.dial.set_interactable(false, now);
        self.authority = Authority::Owned(requester);
        self.publish(SessionMessage::GrantOwnership {
            control_id: self.control_id().clone(),
            participant_id: requester,
            epoch: self.epoch,
        })?;
        Ok(Disposition::Applied)
    }

    fn on_grant(
        &mut self,
        sender: ParticipantId,
        grantee: ParticipantId,
        epoch: Epoch,
        now: Instant,
    ) -> Result<Disposition, SessionError> {
        let local = self.local();
        if epoch != self.epoch {
            if sender == local && self.pending_claim.is_some_and(|claim| claim.epoch == epoch) {
                self.pending_claim = None;
                info!(
                    control_id = %self.control_id(),
                    epoch = %epoch,
                    "ownership: claim lost to an earlier one"
                );
                if self.held {
                    self.request_ownership(now)?;
                }
            }
            return Ok(Disposition::Stale);
        }

        let authorized = match self.confirmed_owner {
            Some(owner) => owner == sender,
            None => sender == grantee,
        };
        if !authorized {
            warn!(
                control_id = %self.control_id(),
                sender = %sender,
                grantee = %grantee,
                "ownership: rejecting grant from a participant without authority"
            );
            return Ok(Disposition::Rejected);
        }

        let previous = self.authority;
        self.epoch = epoch.next();
        self.confirmed_owner = Some(grantee);
        self.authority = Authority::Owned(grantee);
        self.request_deadline = None;

        if grantee == local {
            self.pending_claim = None;
            self.dial.set_local_authority(true);
            self.dial.set_interactable(true, now);
            if self.held && self.dial.set_interacting(true) {
                info!(
                    control_id = %self.control_id(),
                    epoch = %self.epoch,
                    "ownership: control acquired"
                );
            } else {
                info!(
                    control_id = %self.control_id(),
                    epoch = %self.epoch,
                    "ownership: control acquired after release, reopening"
                );
                self.publish(SessionMessage::SetInteractable {
                    control_id: self.control_id().clone(),
                    interactable: true,
                    epoch: self.epoch,
                })?;
            }
        } else {
            debug!(
                control_id = %self.control_id(),
                owner = %grantee,
                epoch = %self.epoch,
                "ownership: control moved to another participant"
            );
            self.dial.set_local_authority(false);
            self.dial.set_interactable(false, now);
            let request_lost = matches!(previous, Authority::PendingRequest { .. });
            if request_lost && self.held {
                self.request_ownership(now)?;
            }
        }
        Ok(Disposition::Applied)
    }

    fn on_set_interactable(
        &mut self,
        sender: ParticipantId,
        interactable: bool,
        epoch: Epoch,
        now: Instant,
    ) -> Disposition {
        if sender == self.local() {
            return Disposition::Ignored;
        }
        if epoch != self.epoch {
            return Disposition::Stale;
        }
        if self.confirmed_owner != Some(sender) {
            return Disposition::Rejected;
        }
        self.dial.set_interactable(interactable, now);
        Disposition::Applied
    }

    fn on_value(
        &mut self,
        sender: ParticipantId,
        value: &ControlValue,
        epoch: Epoch,
        now: Instant,
    ) -> Disposition {
        if sender == self.local() {
            return Disposition::Ignored;
        }
        if epoch != self.epoch {
            return Disposition::Stale;
        }
        if self.confirmed_owner != Some(sender) {
            return Disposition::Rejected;
        }
        self.apply_remote_value(value, now)
    }

    fn on_snapshot(
        &mut self,
        sender: ParticipantId,
        value: &ControlValue,
        epoch: Epoch,
        owner: ParticipantId,
        owner_interacting: bool,
        now: Instant,
    ) -> Disposition {
        if sender == self.local() {
            return Disposition::Ignored;
        }
        if sender != owner {
            return Disposition::Rejected;
        }
        if epoch < self.epoch {
            return Disposition::Stale;
        }

        if epoch > self.epoch {
            info!(
                control_id = %self.control_id(),
                owner = %owner,
                epoch = %epoch,
                "ownership: adopting authority from full state"
            );
            self.epoch = epoch;
            self.confirmed_owner = Some(owner);
            self.authority = Authority::Owned(owner);
            self.request_deadline = None;
            self.pending_claim = None;
            self.dial.set_local_authority(false);
            self.dial.set_interacting(false);
        } else if self.confirmed_owner != Some(sender) {
            return Disposition::Rejected;
        }

        self.dial.set_interactable(!owner_interacting, now);
        self.apply_remote_value(value, now)
    }

    fn apply_remote_value(&mut self, value: &ControlValue, now: Instant) -> Disposition {
        match self.dial.set_value(value, now) {
            Ok(()) => {
                self.dial.take_changed();
                Disposition::Applied
            }
            Err(err) => {
                warn!(
                    control_id = %self.control_id(),
                    error = %err,
                    "ownership: skipping value update"
                );
                Disposition::Rejected
            }
        }
    }

    fn flush_value(&mut self) -> Result<(), SessionError> {
        if !self.dial.take_changed() || !self.is_confirmed_owner() {
            return Ok(());
        }
        self.publish(SessionMessage::ValueUpdate {
            control_id: self.control_id().clone(),
            value: self.dial.value(),
            epoch: self.epoch,
        })
    }

    fn publish(&self, message: SessionMessage) -> Result<(), SessionError> {
        self.ctx.publish(message)
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
