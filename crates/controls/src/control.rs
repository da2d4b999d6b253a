use std::time::Instant;

use serde::Deserialize;
use shared::{
    domain::{ControlId, ControlValue, Euler, Vec2},
    error::ValueError,
};
use tracing::debug;

use crate::{
    angles::{clamp_angle, delta_angle, normalize_degrees},
    helper::{ControlHelper, DialState, HelperContext, HelperId, HelperRegistry},
};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AngleLimits {
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialSettings {
    pub min_value: i32,
    pub max_value: i32,
    pub limits: Option<AngleLimits>,
    pub initial_angle: f32,
    /// Screen-space position of the knob's pivot; pointer samples are measured
    /// relative to it.
    pub screen_center: Vec2,
}

impl Default for DialSettings {
    fn default() -> Self {
        Self {
            min_value: 0,
            max_value: 100,
            limits: None,
            initial_angle: 0.0,
            screen_center: Vec2::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Began,
    Updated(ControlValue),
    Ended,
}

#[derive(Debug, Clone, Copy)]
struct Grab {
    start_angle: f32,
    pointer_angle: f32,
}

/// Interaction state machine for a single rotary dial.
///
/// `begin_interaction` only records the grab and raises [`ControlEvent::Began`];
/// the authority layer commits the Idle → Interacting edge through
/// [`DialControl::set_interacting`] once it knows the local participant owns
/// the dial.
pub struct DialControl {
    state: DialState,
    limits: Option<AngleLimits>,
    screen_center: Vec2,
    grab: Option<Grab>,
    helpers: HelperRegistry,
}

impl DialControl {
    pub fn new(id: ControlId, settings: DialSettings) -> Self {
        let initial = match settings.limits {
            Some(limits) => clamp_angle(settings.initial_angle, limits.left, limits.right),
            None => normalize_degrees(settings.initial_angle),
        };
        Self {
            state: DialState {
                id,
                rotation: Euler::around_z(initial),
                output: settings.min_value,
                min_value: settings.min_value,
                max_value: settings.max_value,
                interacting: false,
                interactable: true,
                local_authority: false,
                changed: false,
            },
            limits: settings.limits,
            screen_center: settings.screen_center,
            grab: None,
            helpers: HelperRegistry::default(),
        }
    }

    pub fn id(&self) -> &ControlId {
        &self.state.id
    }

    pub fn is_interacting(&self) -> bool {
        self.state.interacting
    }

    pub fn is_interactable(&self) -> bool {
        self.state.interactable
    }

    pub fn has_local_authority(&self) -> bool {
        self.state.local_authority
    }

    pub fn value(&self) -> ControlValue {
        ControlValue::Rotation(self.state.rotation)
    }

    pub fn angle(&self) -> f32 {
        self.state.rotation.z
    }

    pub fn output(&self) -> i32 {
        self.state.output
    }

    pub fn helpers(&self) -> &HelperRegistry {
        &self.helpers
    }

    pub fn attach_helper(&mut self, helper: Box<dyn ControlHelper>, now: Instant) -> HelperId {
        let id = self.helpers.attach(helper);
        let mut ctx = HelperContext {
            dial: &mut self.state,
            now,
        };
        if let Some(helper) = self.helpers.get_mut(id) {
            helper.on_attach(&mut ctx);
        }
        id
    }

    pub fn detach_helper(&mut self, id: HelperId) -> bool {
        self.helpers.detach(id).is_some()
    }

    pub fn begin_interaction(&mut self, pointer: Vec2, now: Instant) -> Option<ControlEvent> {
        if self.state.interacting || !self.state.interactable {
            debug!(
                control_id = %self.state.id,
                interacting = self.state.interacting,
                interactable = self.state.interactable,
                "control: begin refused"
            );
            return None;
        }

        self.grab = Some(Grab {
            start_angle: self.state.rotation.z,
            pointer_angle: self.pointer_angle(pointer),
        });
        self.dispatch(now, |helper, ctx| helper.on_begin_interaction(ctx));
        Some(ControlEvent::Began)
    }

    pub fn update_interaction(&mut self, pointer: Vec2, now: Instant) -> Option<ControlEvent> {
        if !self.state.interactable || !self.state.interacting {
            return None;
        }
        let grab = self.grab?;

        // Screen space is y-up, so a clockwise drag yields a negative delta;
        // the dial turns positive in that direction.
        let delta = delta_angle(grab.pointer_angle, self.pointer_angle(pointer));
        let rotation = self.clamped(self.state.rotation.with_z(grab.start_angle - delta));
        self.set_rotation(rotation);

        let value = ControlValue::Rotation(rotation);
        self.dispatch(now, |helper, ctx| helper.on_update_interaction(ctx, &value));
        Some(ControlEvent::Updated(value))
    }

    pub fn end_interaction(&mut self, now: Instant) -> Option<ControlEvent> {
        self.grab = None;
        if !self.state.interacting {
            return None;
        }
        self.state.interacting = false;
        self.dispatch(now, |helper, ctx| helper.on_end_interaction(ctx));
        Some(ControlEvent::Ended)
    }

    /// Commits the Idle → Interacting edge for a pending grab. Returns false
    /// when there is no grab to commit.
    pub fn set_interacting(&mut self, interacting: bool) -> bool {
        if interacting && self.grab.is_none() {
            return false;
        }
        self.state.interacting = interacting;
        true
    }

    pub fn has_pending_grab(&self) -> bool {
        self.grab.is_some()
    }

    pub fn set_interactable(&mut self, interactable: bool, now: Instant) {
        if self.state.interactable == interactable {
            return;
        }
        self.state.interactable = interactable;
        self.state.changed = true;
        self.dispatch(now, |helper, ctx| {
            helper.on_interactable_changed(ctx, interactable)
        });
    }

    pub fn set_local_authority(&mut self, authority: bool) {
        self.state.local_authority = authority;
    }

    /// Applies a value produced elsewhere (the owner's update or a periodic
    /// snapshot) without any interaction transition.
    pub fn set_value(&mut self, value: &ControlValue, now: Instant) -> Result<(), ValueError> {
        let euler = value.as_rotation().ok_or_else(|| ValueError::UnexpectedKind {
            control_id: self.state.id.to_string(),
            expected: "rotation",
            actual: value.kind(),
        })?;
        if !(euler.x.is_finite() && euler.y.is_finite() && euler.z.is_finite()) {
            return Err(ValueError::NonFinite {
                control_id: self.state.id.to_string(),
            });
        }

        let rotation = self.clamped(euler);
        self.set_rotation(rotation);
        let value = ControlValue::Rotation(rotation);
        self.dispatch(now, |helper, ctx| helper.on_update_interaction(ctx, &value));
        Ok(())
    }

    pub fn tick(&mut self, now: Instant) {
        self.dispatch(now, |helper, ctx| helper.on_tick(ctx));
    }

    /// Returns whether the rotation, output or interactability changed since
    /// the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.state.changed)
    }

    fn dispatch(&mut self, now: Instant, mut f: impl FnMut(&mut dyn ControlHelper, &mut HelperContext<'_>)) {
        let mut ctx = HelperContext {
            dial: &mut self.state,
            now,
        };
        for helper in self.helpers.iter_mut() {
            f(helper.as_mut(), &mut ctx);
        }
    }

    fn pointer_angle(&self, pointer: Vec2) -> f32 {
        let offset = pointer - self.screen_center;
        offset.y.atan2(offset.x).to_degrees()
    }

    fn clamped(&self, rotation: Euler) -> Euler {
        let z = match self.limits {
            Some(limits) => clamp_angle(rotation.z, limits.left, limits.right),
            None => normalize_degrees(rotation.z),
        };
        rotation.with_z(z)
    }

    fn set_rotation(&mut self, rotation: Euler) {
        if self.state.rotation != rotation {
            self.state.rotation = rotation;
            self.state.changed = true;
        }
    }
}

#[cfg(test)]
#[path = "tests/control_tests.rs"]
mod tests;
