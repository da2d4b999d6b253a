use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "relay.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub bind_addr: String,
    pub region: String,
    pub broadcast_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8443".into(),
            region: "local".into(),
            broadcast_capacity: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelayFile {
    bind_addr: Option<String>,
    region: Option<String>,
    broadcast_capacity: Option<usize>,
}

pub fn load_settings() -> RelaySettings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file if it exists, then the environment.
pub fn load_settings_from(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> RelaySettings {
    let mut settings = RelaySettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<RelayFile>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.bind_addr {
                    settings.bind_addr = v;
                }
                if let Some(v) = file_cfg.region {
                    settings.region = v;
                }
                if let Some(v) = file_cfg.broadcast_capacity {
                    settings.broadcast_capacity = v;
                }
            }
            Err(error) => warn!(
                path = %path.display(),
                %error,
                "relay: ignoring malformed config file"
            ),
        }
    }

    if let Some(v) = lookup("RELAY_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("APP__REGION") {
        settings.region = v;
    }
    if let Some(v) = lookup("APP__BROADCAST_CAPACITY") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.broadcast_capacity = parsed,
            Err(_) => warn!(value = %v, "relay: APP__BROADCAST_CAPACITY is not a number"),
        }
    }

    // tokio's broadcast channel panics on a zero capacity.
    if settings.broadcast_capacity == 0 {
        warn!("relay: broadcast_capacity must be positive, using 1");
        settings.broadcast_capacity = 1;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
