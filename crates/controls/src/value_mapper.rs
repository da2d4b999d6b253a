use crate::angles::{clamp_lenient, lerp_clamped, FULL_TURN};

pub const DEFAULT_WRAP_ANGLE: f32 = FULL_TURN;

/// Maps a dial rotation onto an integer in `[min_value, max_value]`.
///
/// The angle is folded into `[0, 360)`. Exactly 0° always yields `min_value`.
/// Any other angle is clamped into `[|position_angle|, wrap_angle]` and
/// interpolated linearly, so the output grows as the angle moves from the
/// position toward the wrap angle. Degenerate bounds map to `min_value`.
pub fn map_angle_to_value(
    current_angle: f32,
    min_value: i32,
    max_value: i32,
    position_angle: f32,
    wrap_angle: f32,
) -> i32 {
    let min = min_value as f32;
    let max = max_value as f32;
    let lower = position_angle.abs();

    let mut angle = (current_angle + FULL_TURN) % FULL_TURN;
    if angle < 0.0 {
        angle += FULL_TURN;
    }

    if angle == 0.0 {
        return min_value;
    }

    let angle = clamp_lenient(angle, lower, wrap_angle);
    let t = if lower != wrap_angle {
        (angle - lower) / (wrap_angle - lower)
    } else {
        0.0
    };

    lerp_clamped(min, max, t).floor() as i32
}

#[cfg(test)]
#[path = "tests/value_mapper_tests.rs"]
mod tests;
