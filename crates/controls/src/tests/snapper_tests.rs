use std::time::{Duration, Instant};

use shared::domain::{ControlId, ControlValue, Euler, Vec2};

use super::*;
use crate::control::{DialControl, DialSettings};

const SNAP: Duration = Duration::from_millis(200);
const HOLD: Duration = Duration::from_millis(500);

fn dial_with(snapper: PositionSnapper, now: Instant) -> DialControl {
    let mut dial = DialControl::new(ControlId::new("dial-1"), DialSettings::default());
    dial.set_local_authority(true);
    dial.attach_helper(Box::new(snapper), now);
    dial
}

fn pointer_for(turn: f32) -> Vec2 {
    let radians = (-turn).to_radians();
    Vec2::new(radians.cos(), radians.sin())
}

/// Presses at the 3 o'clock point, commits the interaction and drags the knob
/// from its current angle to `target`.
fn drag_to(dial: &mut DialControl, target: f32, now: Instant) {
    let start = dial.angle();
    dial.begin_interaction(Vec2::new(1.0, 0.0), now)
        .expect("begin accepted");
    assert!(dial.set_interacting(true));
    dial.update_interaction(pointer_for(target - start), now)
        .expect("update accepted");
}

fn assert_angle(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected angle {expected}, got {actual}"
    );
}

fn switch_positions() -> Vec<DialPosition> {
    vec![
        DialPosition::fixed("off", 0.0),
        DialPosition::fixed("on", 90.0),
        DialPosition::momentary("boost", 180.0, HOLD),
    ]
}

#[test]
fn closest_position_uses_wraparound_distance() {
    let snapper = PositionSnapper::new(
        vec![DialPosition::fixed("a", 15.0), DialPosition::fixed("b", 350.0)],
        SNAP,
        Ease::Linear,
    );
    assert_eq!(snapper.closest_index(0.0), Some(1));
    assert_eq!(snapper.closest_index(-5.0), Some(1));
    assert_eq!(snapper.closest_index(359.0), Some(1));
    assert_eq!(snapper.closest_index(10.0), Some(0));
}

#[test]
fn closest_position_ties_go_to_the_first_entry() {
    let snapper = PositionSnapper::new(
        vec![DialPosition::fixed("a", 350.0), DialPosition::fixed("b", 10.0)],
        SNAP,
        Ease::Linear,
    );
    assert_eq!(snapper.closest_index(0.0), Some(0));
}

#[test]
fn fixed_position_snaps_while_dragging() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(switch_positions(), SNAP, Ease::Linear),
        now,
    );

    drag_to(&mut dial, 100.0, now);
    assert_angle(dial.angle(), 100.0);
    assert_eq!(
        dial.output(),
        map_angle_to_value(90.0, 0, 100, 90.0, DEFAULT_WRAP_ANGLE)
    );

    dial.tick(now + SNAP / 2);
    assert_angle(dial.angle(), 95.0);
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 90.0);
}

#[test]
fn free_position_tracks_the_raw_angle() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(
            vec![DialPosition::fixed("off", 0.0), DialPosition::free("range", 90.0)],
            SNAP,
            Ease::Linear,
        ),
        now,
    );

    drag_to(&mut dial, 200.0, now);
    assert_eq!(dial.output(), map_angle_to_value(dial.angle(), 0, 100, 90.0, 360.0));
    assert!(dial.output() > 0);

    dial.tick(now + SNAP * 3);
    assert_angle(dial.angle(), 200.0);

    dial.end_interaction(now + SNAP * 3).expect("end");
    dial.tick(now + SNAP * 6);
    assert_angle(dial.angle(), 200.0);
}

#[test]
fn end_snaps_once_and_repeated_end_is_a_no_op() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(
            vec![DialPosition::fixed("off", 0.0), DialPosition::fixed("on", 90.0)],
            SNAP,
            Ease::Linear,
        ),
        now,
    );

    drag_to(&mut dial, 60.0, now);
    assert_eq!(dial.end_interaction(now), Some(crate::control::ControlEvent::Ended));
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 90.0);

    assert_eq!(dial.end_interaction(now + SNAP), None);
    dial.tick(now + SNAP * 4);
    assert_angle(dial.angle(), 90.0);
}

#[test]
fn momentary_position_returns_to_previous_entry_after_delay() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(switch_positions(), SNAP, Ease::Linear),
        now,
    );

    drag_to(&mut dial, 175.0, now);
    // Dragging near a momentary position does not animate.
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 175.0);

    let released = now + SNAP;
    dial.end_interaction(released).expect("end");
    dial.tick(released + SNAP);
    assert_angle(dial.angle(), 180.0);

    dial.tick(released + SNAP + HOLD / 2);
    assert_angle(dial.angle(), 180.0);

    dial.tick(released + SNAP + HOLD + SNAP / 2);
    assert_angle(dial.angle(), 135.0);

    dial.tick(released + SNAP + HOLD + SNAP);
    assert_angle(dial.angle(), 90.0);
}

#[test]
fn unrepresentable_momentary_delay_skips_the_return() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(
            vec![
                DialPosition::fixed("off", 0.0),
                DialPosition::momentary("boost", 90.0, Duration::from_secs_f32(1e19)),
            ],
            SNAP,
            Ease::Linear,
        ),
        now,
    );

    drag_to(&mut dial, 85.0, now);
    dial.end_interaction(now).expect("end");
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 90.0);

    dial.tick(now + SNAP + HOLD * 10);
    assert_angle(dial.angle(), 90.0);
}

#[test]
fn momentary_position_at_index_zero_stays_put() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(
            vec![
                DialPosition::momentary("kick", 0.0, HOLD),
                DialPosition::fixed("on", 90.0),
            ],
            SNAP,
            Ease::Linear,
        ),
        now,
    );

    drag_to(&mut dial, 20.0, now);
    dial.end_interaction(now).expect("end");
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 0.0);

    dial.tick(now + SNAP * 4 + HOLD * 4);
    assert_angle(dial.angle(), 0.0);
}

#[test]
fn new_interaction_cancels_pending_return() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(switch_positions(), SNAP, Ease::Linear),
        now,
    );

    drag_to(&mut dial, 178.0, now);
    dial.end_interaction(now).expect("end");
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 180.0);

    dial.begin_interaction(Vec2::new(1.0, 0.0), now + SNAP)
        .expect("begin accepted");
    dial.tick(now + SNAP * 4 + HOLD * 2);
    assert_angle(dial.angle(), 180.0);
}

#[test]
fn snapper_without_authority_only_derives_output() {
    let now = Instant::now();
    let mut dial = dial_with(
        PositionSnapper::new(switch_positions(), SNAP, Ease::Linear),
        now,
    );
    dial.set_local_authority(false);

    dial.set_value(&ControlValue::Rotation(Euler::around_z(100.0)), now)
        .expect("rotation accepted");
    assert_eq!(
        dial.output(),
        map_angle_to_value(90.0, 0, 100, 90.0, DEFAULT_WRAP_ANGLE)
    );
    dial.tick(now + SNAP * 2);
    assert_angle(dial.angle(), 100.0);
}

#[test]
fn empty_position_list_disables_the_snapper() {
    let now = Instant::now();
    let mut dial = dial_with(PositionSnapper::new(Vec::new(), SNAP, Ease::Linear), now);

    drag_to(&mut dial, 45.0, now);
    dial.end_interaction(now).expect("end");
    dial.tick(now + SNAP);
    assert_angle(dial.angle(), 45.0);
    assert_eq!(dial.output(), 0);
}

#[test]
fn starting_position_rotates_the_knob_on_attach() {
    let now = Instant::now();
    let dial = dial_with(
        PositionSnapper::new(switch_positions(), SNAP, Ease::Linear).with_starting_position("on"),
        now,
    );
    assert_angle(dial.angle(), 90.0);

    let missing = dial_with(
        PositionSnapper::new(switch_positions(), SNAP, Ease::Linear)
            .with_starting_position("missing"),
        now,
    );
    assert_angle(missing.angle(), 0.0);
}

#[test]
fn easing_curves_hit_both_ends() {
    for ease in [
        Ease::Linear,
        Ease::InQuad,
        Ease::OutQuad,
        Ease::InOutQuad,
        Ease::OutCubic,
        Ease::InOutSine,
    ] {
        assert!(ease.apply(0.0).abs() < 1e-6, "{ease:?} at 0");
        assert!((ease.apply(1.0) - 1.0).abs() < 1e-6, "{ease:?} at 1");
    }
}
