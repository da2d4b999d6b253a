use std::time::Instant;

use shared::domain::{ControlId, ControlValue, Euler};

/// Mutable view of a dial handed to helpers while an event is dispatched.
pub(crate) struct DialState {
    pub(crate) id: ControlId,
    pub(crate) rotation: Euler,
    pub(crate) output: i32,
    pub(crate) min_value: i32,
    pub(crate) max_value: i32,
    pub(crate) interacting: bool,
    pub(crate) interactable: bool,
    pub(crate) local_authority: bool,
    pub(crate) changed: bool,
}

pub struct HelperContext<'a> {
    pub(crate) dial: &'a mut DialState,
    pub(crate) now: Instant,
}

impl HelperContext<'_> {
    pub fn control_id(&self) -> &ControlId {
        &self.dial.id
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// True while the local participant is the confirmed owner of the control.
    pub fn has_authority(&self) -> bool {
        self.dial.local_authority
    }

    pub fn is_interacting(&self) -> bool {
        self.dial.interacting
    }

    pub fn angle(&self) -> f32 {
        self.dial.rotation.z
    }

    pub fn set_angle(&mut self, angle: f32) {
        if self.dial.rotation.z != angle {
            self.dial.rotation = self.dial.rotation.with_z(angle);
            self.dial.changed = true;
        }
    }

    pub fn min_value(&self) -> i32 {
        self.dial.min_value
    }

    pub fn max_value(&self) -> i32 {
        self.dial.max_value
    }

    pub fn output(&self) -> i32 {
        self.dial.output
    }

    pub fn set_output(&mut self, output: i32) {
        if self.dial.output != output {
            self.dial.output = output;
            self.dial.changed = true;
        }
    }
}

/// Capability attached to a control. Every callback has a no-op default so a
/// helper only implements the events it cares about.
pub trait ControlHelper: Send {
    fn name(&self) -> &'static str;

    fn on_attach(&mut self, _ctx: &mut HelperContext<'_>) {}

    fn on_begin_interaction(&mut self, _ctx: &mut HelperContext<'_>) {}

    fn on_update_interaction(&mut self, _ctx: &mut HelperContext<'_>, _value: &ControlValue) {}

    fn on_end_interaction(&mut self, _ctx: &mut HelperContext<'_>) {}

    fn on_interactable_changed(&mut self, _ctx: &mut HelperContext<'_>, _interactable: bool) {}

    /// Called once per frame so time-based work can advance.
    fn on_tick(&mut self, _ctx: &mut HelperContext<'_>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HelperId(u64);

/// Per-control subscription list. Attaching subscribes a helper to every
/// event of the owning control; detaching (or dropping the control) removes it.
#[derive(Default)]
pub struct HelperRegistry {
    next_id: u64,
    entries: Vec<(HelperId, Box<dyn ControlHelper>)>,
}

impl HelperRegistry {
    pub(crate) fn attach(&mut self, helper: Box<dyn ControlHelper>) -> HelperId {
        let id = HelperId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, helper));
        id
    }

    pub(crate) fn detach(&mut self, id: HelperId) -> Option<Box<dyn ControlHelper>> {
        let index = self.entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        Some(self.entries.remove(index).1)
    }

    pub(crate) fn get_mut(&mut self, id: HelperId) -> Option<&mut (dyn ControlHelper + 'static)> {
        self.entries
            .iter_mut()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, helper)| helper.as_mut())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(_, helper)| helper.name()).collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn ControlHelper>> {
        self.entries.iter_mut().map(|(_, helper)| helper)
    }
}
