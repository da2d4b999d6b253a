//! Degree arithmetic shared by the dial, the snapper and the value mapper.

pub const FULL_TURN: f32 = 360.0;

/// Folds an angle into `[0, 360)` the same way the value mapper does, so that
/// both agree on where the 0° boundary sits.
pub fn normalize_degrees(angle: f32) -> f32 {
    let folded = (angle + FULL_TURN) % FULL_TURN;
    if folded < 0.0 {
        folded + FULL_TURN
    } else {
        folded
    }
}

/// Signed shortest rotation from `current` to `target`, in `(-180, 180]`.
pub fn delta_angle(current: f32, target: f32) -> f32 {
    let delta = repeat(target - current, FULL_TURN);
    if delta > 180.0 {
        delta - FULL_TURN
    } else {
        delta
    }
}

/// Wraparound distance between two angles, in `[0, 180]`.
pub fn angular_distance(a: f32, b: f32) -> f32 {
    delta_angle(a, b).abs()
}

fn repeat(value: f32, length: f32) -> f32 {
    clamp_lenient(value - (value / length).floor() * length, 0.0, length)
}

/// Clamp that never panics: when `min > max` the lower bound wins.
pub fn clamp_lenient(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

pub fn lerp_clamped(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * clamp_lenient(t, 0.0, 1.0)
}

/// Clamps `angle` into the arc `[min, max]`. When the arc crosses 0° (`min`
/// normalizes above `max`) angles outside it go to whichever end is nearer the
/// arc's midpoint split.
pub fn clamp_angle(angle: f32, min: f32, max: f32) -> f32 {
    let angle = normalize_degrees(angle);
    let min = normalize_degrees(min);
    let max = normalize_degrees(max);

    if min > max {
        if angle > max && angle < min {
            return if angle < (min + max) / 2.0 { max } else { min };
        }
        angle
    } else {
        clamp_lenient(angle, min, max)
    }
}
