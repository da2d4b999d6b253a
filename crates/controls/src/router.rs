use shared::domain::{ControlId, Vec2};
use tracing::trace;

/// One frame of raw pointer input: the cursor in screen space and the control
/// under it, if the external hit test found one.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerSample {
    pub position: Vec2,
    pub hit: Option<ControlId>,
}

impl PointerSample {
    pub fn new(position: Vec2, hit: Option<ControlId>) -> Self {
        Self { position, hit }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutedInput {
    Begin { control_id: ControlId, position: Vec2 },
    Update { control_id: ControlId, position: Vec2 },
    End { control_id: ControlId },
}

impl RoutedInput {
    pub fn control_id(&self) -> &ControlId {
        match self {
            RoutedInput::Begin { control_id, .. }
            | RoutedInput::Update { control_id, .. }
            | RoutedInput::End { control_id } => control_id,
        }
    }
}

/// Turns press / move / release gestures into per-control interaction calls.
///
/// Only a press changes which control a later release is delivered to; moving
/// over another control while held never retargets the release.
#[derive(Debug, Default)]
pub struct InteractionRouter {
    active: Option<ControlId>,
}

impl InteractionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ControlId> {
        self.active.as_ref()
    }

    pub fn press(&mut self, sample: PointerSample) -> Option<RoutedInput> {
        let control_id = sample.hit?;
        trace!(control_id = %control_id, "router: press");
        self.active = Some(control_id.clone());
        Some(RoutedInput::Begin {
            control_id,
            position: sample.position,
        })
    }

    /// Moves go to whatever control is under the cursor; controls that are
    /// not interacting ignore them.
    pub fn drag(&mut self, sample: PointerSample) -> Option<RoutedInput> {
        let control_id = sample.hit?;
        Some(RoutedInput::Update {
            control_id,
            position: sample.position,
        })
    }

    pub fn release(&mut self) -> Option<RoutedInput> {
        let control_id = self.active.take()?;
        trace!(control_id = %control_id, "router: release");
        Some(RoutedInput::End { control_id })
    }

    /// Drops the active control without producing an end, used when the
    /// control goes away mid-gesture.
    pub fn forget(&mut self, control_id: &ControlId) {
        if self.active.as_ref() == Some(control_id) {
            self.active = None;
        }
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
