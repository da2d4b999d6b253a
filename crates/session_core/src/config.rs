use std::{
    collections::HashSet,
    fs,
    path::Path,
    time::{Duration, Instant},
};

use controls::{AngleLimits, DialControl, DialPosition, DialSettings, Ease, PositionSnapper};
use serde::Deserialize;
use shared::domain::{ControlId, Vec2};
use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_ROOM: &str = "DialMania";
const DEFAULT_SNAP_SECONDS: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParticipantSettings {
    pub server_url: String,
    pub room: String,
    pub request_timeout_ms: u64,
    /// Period of the owner's full-state rebroadcast; 100ms is 10 Hz.
    pub full_state_interval_ms: u64,
    pub frame_interval_ms: u64,
    pub dials: Vec<DialSpec>,
}

impl Default for ParticipantSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            room: DEFAULT_ROOM.into(),
            request_timeout_ms: 500,
            full_state_interval_ms: 100,
            frame_interval_ms: 16,
            dials: vec![DialSpec::default_dial()],
        }
    }
}

impl ParticipantSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn full_state_interval(&self) -> Duration {
        Duration::from_millis(self.full_state_interval_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Dial entries that can be built. Entries with an empty or duplicate id,
    /// or an inverted value range, are logged and skipped.
    pub fn valid_dials(&self) -> Vec<&DialSpec> {
        let mut seen = HashSet::new();
        let mut dials = Vec::with_capacity(self.dials.len());
        for dial in &self.dials {
            if dial.id.trim().is_empty() {
                warn!("config: skipping dial with an empty id");
                continue;
            }
            if !seen.insert(dial.id.as_str()) {
                warn!(control_id = %dial.id, "config: skipping duplicate dial id");
                continue;
            }
            if dial.min_value > dial.max_value {
                warn!(
                    control_id = %dial.id,
                    min_value = dial.min_value,
                    max_value = dial.max_value,
                    "config: skipping dial with min_value above max_value"
                );
                continue;
            }
            dials.push(dial);
        }
        dials
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DialSpec {
    pub id: String,
    #[serde(default)]
    pub min_value: i32,
    #[serde(default = "default_max_value")]
    pub max_value: i32,
    #[serde(default)]
    pub left_limit: Option<f32>,
    #[serde(default)]
    pub right_limit: Option<f32>,
    #[serde(default)]
    pub initial_angle: f32,
    #[serde(default)]
    pub screen_center: Vec2,
    #[serde(default)]
    pub snapper: Option<SnapperSpec>,
}

fn default_max_value() -> i32 {
    100
}

impl DialSpec {
    fn default_dial() -> Self {
        Self {
            id: "dial-1".into(),
            min_value: 0,
            max_value: default_max_value(),
            left_limit: None,
            right_limit: None,
            initial_angle: 0.0,
            screen_center: Vec2::default(),
            snapper: Some(SnapperSpec {
                starting_position: Some("off".into()),
                snap_seconds: DEFAULT_SNAP_SECONDS,
                ease: Ease::OutQuad,
                positions: vec![
                    PositionSpec::fixed("off", 0.0),
                    PositionSpec {
                        is_free: true,
                        ..PositionSpec::fixed("range", 45.0)
                    },
                    PositionSpec {
                        is_momentary: true,
                        momentary_delay_seconds: 0.5,
                        ..PositionSpec::fixed("boost", 315.0)
                    },
                ],
            }),
        }
    }

    pub fn limits(&self) -> Option<AngleLimits> {
        match (self.left_limit, self.right_limit) {
            (Some(left), Some(right)) => Some(AngleLimits { left, right }),
            (None, None) => None,
            _ => {
                warn!(
                    control_id = %self.id,
                    "config: only one angle limit set, ignoring limits"
                );
                None
            }
        }
    }

    pub fn build(&self, now: Instant) -> DialControl {
        let mut dial = DialControl::new(
            ControlId::new(self.id.clone()),
            DialSettings {
                min_value: self.min_value,
                max_value: self.max_value,
                limits: self.limits(),
                initial_angle: self.initial_angle,
                screen_center: self.screen_center,
            },
        );
        if let Some(snapper) = &self.snapper {
            dial.attach_helper(Box::new(snapper.build(&self.id)), now);
        }
        dial
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapperSpec {
    #[serde(default)]
    pub starting_position: Option<String>,
    #[serde(default = "default_snap_seconds")]
    pub snap_seconds: f32,
    #[serde(default)]
    pub ease: Ease,
    #[serde(default)]
    pub positions: Vec<PositionSpec>,
}

fn default_snap_seconds() -> f32 {
    DEFAULT_SNAP_SECONDS
}

impl SnapperSpec {
    pub fn build(&self, control_id: &str) -> PositionSnapper {
        let snap = seconds(self.snap_seconds).unwrap_or_else(|| {
            warn!(
                control_id,
                snap_seconds = self.snap_seconds,
                "config: invalid snap duration, using default"
            );
            Duration::from_secs_f32(DEFAULT_SNAP_SECONDS)
        });
        let positions = self
            .positions
            .iter()
            .map(|position| position.build(control_id))
            .collect();

        let snapper = PositionSnapper::new(positions, snap, self.ease);
        match &self.starting_position {
            Some(name) => snapper.with_starting_position(name.clone()),
            None => snapper,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionSpec {
    pub name: String,
    pub angle: f32,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub is_momentary: bool,
    #[serde(default)]
    pub momentary_delay_seconds: f32,
}

impl PositionSpec {
    fn fixed(name: &str, angle: f32) -> Self {
        Self {
            name: name.into(),
            angle,
            is_free: false,
            is_momentary: false,
            momentary_delay_seconds: 0.0,
        }
    }

    fn build(&self, control_id: &str) -> DialPosition {
        let delay = seconds(self.momentary_delay_seconds).unwrap_or_else(|| {
            warn!(
                control_id,
                position = %self.name,
                "config: invalid momentary delay, using zero"
            );
            Duration::ZERO
        });
        DialPosition {
            name: self.name.clone(),
            angle: self.angle,
            is_free: self.is_free,
            is_momentary: self.is_momentary,
            momentary_delay: delay,
        }
    }
}

fn seconds(value: f32) -> Option<Duration> {
    Duration::try_from_secs_f32(value).ok()
}

/// Defaults, then the TOML file at `path` if one is given, then `APP__*`
/// environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<ParticipantSettings, ConfigError> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<ParticipantSettings>(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        }
        None => ParticipantSettings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_env_overrides(
    settings: &mut ParticipantSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__ROOM") {
        settings.room = v;
    }
    override_millis(&lookup, "APP__REQUEST_TIMEOUT_MS", &mut settings.request_timeout_ms);
    override_millis(
        &lookup,
        "APP__FULL_STATE_INTERVAL_MS",
        &mut settings.full_state_interval_ms,
    );
    override_millis(&lookup, "APP__FRAME_INTERVAL_MS", &mut settings.frame_interval_ms);
}

fn override_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut u64) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse::<u64>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key, value = %raw, "config: ignoring non-numeric override"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
