use std::time::{Duration, Instant};

use serde::Deserialize;
use shared::domain::ControlValue;
use tracing::{debug, warn};

use crate::{
    angles::{angular_distance, delta_angle, normalize_degrees},
    helper::{ControlHelper, HelperContext},
    value_mapper::{map_angle_to_value, DEFAULT_WRAP_ANGLE},
};

#[derive(Debug, Clone, PartialEq)]
pub struct DialPosition {
    pub name: String,
    pub angle: f32,
    pub is_free: bool,
    pub is_momentary: bool,
    pub momentary_delay: Duration,
}

impl DialPosition {
    pub fn fixed(name: impl Into<String>, angle: f32) -> Self {
        Self {
            name: name.into(),
            angle,
            is_free: false,
            is_momentary: false,
            momentary_delay: Duration::ZERO,
        }
    }

    pub fn free(name: impl Into<String>, angle: f32) -> Self {
        Self {
            is_free: true,
            ..Self::fixed(name, angle)
        }
    }

    pub fn momentary(name: impl Into<String>, angle: f32, delay: Duration) -> Self {
        Self {
            is_momentary: true,
            momentary_delay: delay,
            ..Self::fixed(name, angle)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    OutCubic,
    InOutSine,
}

impl Ease {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Ease::Linear => t,
            Ease::InQuad => t * t,
            Ease::OutQuad => t * (2.0 - t),
            Ease::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Ease::OutCubic => 1.0 - (1.0 - t).powi(3),
            Ease::InOutSine => -((std::f32::consts::PI * t).cos() - 1.0) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SnapTween {
    from: f32,
    to: f32,
    starts_at: Instant,
    duration: Duration,
}

impl SnapTween {
    /// Rotates along the shorter arc. Returns the angle and whether the tween
    /// has reached its target.
    fn sample(&self, now: Instant, ease: Ease) -> (f32, bool) {
        let elapsed = now.saturating_duration_since(self.starts_at);
        if self.duration.is_zero() || elapsed >= self.duration {
            return (normalize_degrees(self.to), true);
        }
        let t = ease.apply(elapsed.as_secs_f32() / self.duration.as_secs_f32());
        let angle = self.from + delta_angle(self.from, self.to) * t;
        (normalize_degrees(angle), false)
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledReturn {
    index: usize,
    at: Instant,
}

/// Snaps a dial to the nearest of a fixed list of named positions.
///
/// Animations only run while the local participant holds authority over the
/// dial. Without authority the snapper still derives the output value so the
/// local view converges with the owner's.
pub struct PositionSnapper {
    positions: Vec<DialPosition>,
    starting_position: Option<String>,
    snap_duration: Duration,
    ease: Ease,
    enabled: bool,
    current: Option<usize>,
    is_snapped: bool,
    tween: Option<SnapTween>,
    pending_return: Option<ScheduledReturn>,
}

impl PositionSnapper {
    pub fn new(positions: Vec<DialPosition>, snap_duration: Duration, ease: Ease) -> Self {
        Self {
            positions,
            starting_position: None,
            snap_duration,
            ease,
            enabled: true,
            current: None,
            is_snapped: false,
            tween: None,
            pending_return: None,
        }
    }

    pub fn with_starting_position(mut self, name: impl Into<String>) -> Self {
        self.starting_position = Some(name.into());
        self
    }

    pub fn positions(&self) -> &[DialPosition] {
        &self.positions
    }

    pub fn current_position(&self) -> Option<&DialPosition> {
        self.current.map(|index| &self.positions[index])
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_snapped(&self) -> bool {
        self.is_snapped
    }

    pub fn has_pending_return(&self) -> bool {
        self.pending_return.is_some()
    }

    /// Index of the position nearest to `angle` by wraparound distance. Ties
    /// go to the earlier entry.
    pub fn closest_index(&self, angle: f32) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, position) in self.positions.iter().enumerate() {
            let distance = angular_distance(angle, position.angle);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((index, distance)),
            }
        }
        best.map(|(index, _)| index)
    }

    fn mapped(&self, ctx: &HelperContext<'_>, angle: f32, position_angle: f32) -> i32 {
        map_angle_to_value(
            angle,
            ctx.min_value(),
            ctx.max_value(),
            position_angle,
            DEFAULT_WRAP_ANGLE,
        )
    }

    fn cancel_animation(&mut self) {
        self.tween = None;
        self.pending_return = None;
    }

    fn snap_to(&mut self, index: usize, ctx: &mut HelperContext<'_>) {
        let position = &self.positions[index];
        if position.is_free && !position.is_momentary {
            let output = self.mapped(ctx, ctx.angle(), position.angle);
            ctx.set_output(output);
            return;
        }

        let now = ctx.now();
        let target = position.angle;
        self.tween = Some(SnapTween {
            from: ctx.angle(),
            to: target,
            starts_at: now,
            duration: self.snap_duration,
        });
        self.current = Some(index);
        let output = self.mapped(ctx, target, target);
        ctx.set_output(output);

        let position = &self.positions[index];
        if position.is_momentary {
            if index > 0 {
                let at = now
                    .checked_add(self.snap_duration)
                    .and_then(|at| at.checked_add(position.momentary_delay));
                match at {
                    Some(at) => {
                        self.pending_return = Some(ScheduledReturn {
                            index: index - 1,
                            at,
                        })
                    }
                    None => warn!(
                        control_id = %ctx.control_id(),
                        position = %position.name,
                        "snapper: momentary delay out of range, not scheduling a return"
                    ),
                }
            } else {
                warn!(
                    control_id = %ctx.control_id(),
                    position = %position.name,
                    "snapper: momentary position has no previous entry to return to"
                );
            }
        }
    }

    fn settle(&mut self, ctx: &mut HelperContext<'_>) {
        if !self.enabled || !ctx.has_authority() || self.is_snapped {
            return;
        }
        let Some(index) = self.closest_index(ctx.angle()) else {
            return;
        };
        self.snap_to(index, ctx);
        self.is_snapped = true;
    }
}

impl ControlHelper for PositionSnapper {
    fn name(&self) -> &'static str {
        "position_snapper"
    }

    fn on_attach(&mut self, ctx: &mut HelperContext<'_>) {
        if self.positions.is_empty() {
            warn!(
                control_id = %ctx.control_id(),
                "snapper: no dial positions configured, disabling"
            );
            self.enabled = false;
            return;
        }

        let Some(name) = self.starting_position.as_deref() else {
            return;
        };
        match self.positions.iter().position(|position| position.name == name) {
            Some(index) => {
                let angle = self.positions[index].angle;
                self.current = Some(index);
                ctx.set_angle(normalize_degrees(angle));
                let output = self.mapped(ctx, angle, angle);
                ctx.set_output(output);
            }
            None => warn!(
                control_id = %ctx.control_id(),
                starting_position = name,
                "snapper: starting position not found"
            ),
        }
    }

    fn on_begin_interaction(&mut self, _ctx: &mut HelperContext<'_>) {
        self.is_snapped = false;
        self.cancel_animation();
    }

    fn on_update_interaction(&mut self, ctx: &mut HelperContext<'_>, value: &ControlValue) {
        if !self.enabled {
            return;
        }
        let Some(rotation) = value.as_rotation() else {
            debug!(
                control_id = %ctx.control_id(),
                kind = value.kind(),
                "snapper: ignoring non-rotation value"
            );
            return;
        };
        let Some(index) = self.closest_index(rotation.z) else {
            return;
        };

        self.current = Some(index);
        let position = &self.positions[index];
        if !position.is_free && !position.is_momentary {
            let output = self.mapped(ctx, position.angle, position.angle);
            ctx.set_output(output);
            if ctx.has_authority() {
                self.snap_to(index, ctx);
            }
        } else {
            let output = self.mapped(ctx, rotation.z, position.angle);
            ctx.set_output(output);
            self.is_snapped = false;
        }
    }

    fn on_end_interaction(&mut self, ctx: &mut HelperContext<'_>) {
        self.settle(ctx);
    }

    fn on_interactable_changed(&mut self, ctx: &mut HelperContext<'_>, _interactable: bool) {
        self.settle(ctx);
    }

    fn on_tick(&mut self, ctx: &mut HelperContext<'_>) {
        if !ctx.has_authority() {
            self.cancel_animation();
            return;
        }

        let now = ctx.now();
        if self.tween.is_none() {
            if let Some(scheduled) = self.pending_return {
                if scheduled.at <= now {
                    self.pending_return = None;
                    self.current = Some(scheduled.index);
                    let target = self.positions[scheduled.index].angle;
                    self.tween = Some(SnapTween {
                        from: ctx.angle(),
                        to: target,
                        starts_at: scheduled.at,
                        duration: self.snap_duration,
                    });
                    let output = self.mapped(ctx, target, target);
                    ctx.set_output(output);
                }
            }
        }

        if let Some(tween) = self.tween {
            let (angle, finished) = tween.sample(now, self.ease);
            ctx.set_angle(angle);
            if finished {
                self.tween = None;
                self.is_snapped = true;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/snapper_tests.rs"]
mod tests;
