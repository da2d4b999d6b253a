use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

const DIALS_TOML: &str = r#"
room = "Studio"
full_state_interval_ms = 50

[[dials]]
id = "gain"
min_value = 10
max_value = 20
left_limit = 0.0
right_limit = 270.0
initial_angle = 90.0
screen_center = { x = 320.0, y = 240.0 }

[dials.snapper]
starting_position = "low"
snap_seconds = 0.1
ease = "in_out_sine"

[[dials.snapper.positions]]
name = "low"
angle = 30.0

[[dials.snapper.positions]]
name = "sweep"
angle = 90.0
is_free = true

[[dials.snapper.positions]]
name = "kick"
angle = 250.0
is_momentary = true
momentary_delay_seconds = 0.25

[[dials]]
id = "pan"
"#;

fn temp_path(name: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("dial_session_{name}_{suffix}.toml"))
}

#[test]
fn defaults_match_the_shared_room() {
    let settings = ParticipantSettings::default();
    assert_eq!(settings.room, DEFAULT_ROOM);
    assert_eq!(settings.full_state_interval(), Duration::from_millis(100));
    assert_eq!(settings.dials.len(), 1);
    assert_eq!(settings.dials[0].id, "dial-1");
}

#[test]
fn parses_dials_with_snapper_positions() {
    let settings: ParticipantSettings = toml::from_str(DIALS_TOML).expect("parse");
    assert_eq!(settings.room, "Studio");
    assert_eq!(settings.full_state_interval_ms, 50);
    assert_eq!(settings.request_timeout_ms, 500);
    assert_eq!(settings.dials.len(), 2);

    let gain = &settings.dials[0];
    assert_eq!(gain.screen_center, Vec2::new(320.0, 240.0));
    assert_eq!(
        gain.limits(),
        Some(AngleLimits {
            left: 0.0,
            right: 270.0,
        })
    );
    let snapper = gain.snapper.as_ref().expect("snapper");
    assert_eq!(snapper.ease, Ease::InOutSine);
    assert_eq!(snapper.positions.len(), 3);
    assert!(snapper.positions[2].is_momentary);

    let pan = &settings.dials[1];
    assert_eq!(pan.max_value, 100);
    assert_eq!(pan.snapper, None);
}

#[test]
fn built_dial_starts_at_the_configured_position() {
    let settings: ParticipantSettings = toml::from_str(DIALS_TOML).expect("parse");
    let dial = settings.dials[0].build(Instant::now());

    assert_eq!(dial.id(), &ControlId::new("gain"));
    assert_eq!(dial.angle(), 30.0);
    assert_eq!(dial.helpers().names(), vec!["position_snapper"]);
    assert_eq!(dial.output(), 10);
}

#[test]
fn invalid_dial_entries_are_skipped() {
    let mut settings = ParticipantSettings::default();
    let mut blank = settings.dials[0].clone();
    blank.id = "  ".into();
    let mut inverted = settings.dials[0].clone();
    inverted.id = "inverted".into();
    inverted.min_value = 50;
    inverted.max_value = 5;
    let duplicate = settings.dials[0].clone();
    settings.dials.extend([duplicate, blank, inverted]);

    let ids: Vec<_> = settings
        .valid_dials()
        .into_iter()
        .map(|dial| dial.id.as_str())
        .collect();
    assert_eq!(ids, vec!["dial-1"]);
}

#[test]
fn one_sided_limits_are_ignored() {
    let mut spec = ParticipantSettings::default().dials.remove(0);
    spec.left_limit = Some(10.0);
    assert_eq!(spec.limits(), None);
}

#[test]
fn negative_durations_fall_back() {
    let spec = SnapperSpec {
        starting_position: None,
        snap_seconds: -1.0,
        ease: Ease::Linear,
        positions: vec![PositionSpec {
            momentary_delay_seconds: f32::NAN,
            ..PositionSpec::fixed("only", 0.0)
        }],
    };
    let snapper = spec.build("dial-x");
    assert_eq!(snapper.positions()[0].momentary_delay, Duration::ZERO);
}

#[test]
fn environment_overrides_win_over_file_values() {
    let mut settings: ParticipantSettings = toml::from_str(DIALS_TOML).expect("parse");
    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__ROOM", "Override"),
        ("APP__SERVER_URL", "http://relay.test:9000"),
        ("APP__REQUEST_TIMEOUT_MS", "750"),
        ("APP__FRAME_INTERVAL_MS", "fast"),
    ]);

    apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.room, "Override");
    assert_eq!(settings.server_url, "http://relay.test:9000");
    assert_eq!(settings.request_timeout(), Duration::from_millis(750));
    assert_eq!(settings.frame_interval_ms, 16);
    assert_eq!(settings.full_state_interval_ms, 50);
}

#[test]
fn zero_intervals_are_floored() {
    let settings = ParticipantSettings {
        full_state_interval_ms: 0,
        frame_interval_ms: 0,
        ..ParticipantSettings::default()
    };
    assert_eq!(settings.full_state_interval(), Duration::from_millis(1));
    assert_eq!(settings.frame_interval(), Duration::from_millis(1));
}

#[test]
fn load_settings_reads_toml_file() {
    let path = temp_path("load");
    fs::write(&path, DIALS_TOML).expect("write config");

    let settings = load_settings(Some(path.as_path())).expect("load");
    assert_eq!(settings.dials.len(), 2);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn load_settings_reports_missing_and_malformed_files() {
    let missing = temp_path("missing");
    assert!(matches!(
        load_settings(Some(missing.as_path())),
        Err(ConfigError::Read { .. })
    ));

    let malformed = temp_path("malformed");
    fs::write(&malformed, "dials = 3").expect("write config");
    assert!(matches!(
        load_settings(Some(malformed.as_path())),
        Err(ConfigError::Parse { .. })
    ));
    fs::remove_file(malformed).expect("cleanup");
}
