//! Configuration Vault – reads/writes `~/.minisafe/config.toml`.
//!
//! The file has two tables: `[safety]` holds the
//! [`SupervisorConfig`] and `[sim]` tunes the simulated hardware the CLI
//! drives.  `MINISAFE_CONFIG` points at an alternative file.

use std::fs;
use std::path::{Path, PathBuf};

use minisafe_runtime::{HazardSourceKind, SupervisorConfig};
use serde::{Deserialize, Serialize};

/// Simulated hardware settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Distance the simulated proximity sensor reports at startup.
    #[serde(default = "default_start_distance_cm")]
    pub start_distance_cm: f32,

    #[serde(default = "default_battery_start_percent")]
    pub battery_start_percent: u8,

    /// Charge lost on every battery poll.
    #[serde(default = "default_battery_drain_per_poll")]
    pub battery_drain_per_poll: u8,

    /// How long each simulated move takes.
    #[serde(default = "default_actuator_latency_ms")]
    pub actuator_latency_ms: u64,
}

fn default_start_distance_cm() -> f32 {
    100.0
}
fn default_battery_start_percent() -> u8 {
    35
}
fn default_battery_drain_per_poll() -> u8 {
    3
}
fn default_actuator_latency_ms() -> u64 {
    150
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_distance_cm: default_start_distance_cm(),
            battery_start_percent: default_battery_start_percent(),
            battery_drain_per_poll: default_battery_drain_per_poll(),
            actuator_latency_ms: default_actuator_latency_ms(),
        }
    }
}

/// Persisted configuration stored in `~/.minisafe/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub safety: SupervisorConfig,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Return `MINISAFE_CONFIG` if set, else `~/.minisafe/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("MINISAFE_CONFIG")
        && !p.trim().is_empty()
    {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".minisafe").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Apply `MINISAFE_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `MINISAFE_HAZARD_SOURCE` | `safety.hazard_source` (`proximity` / `posture`) |
/// | `MINISAFE_SOFT_DISTANCE_CM` | `safety.soft_distance_cm` |
/// | `MINISAFE_HARD_DISTANCE_CM` | `safety.hard_distance_cm` |
/// | `MINISAFE_TICK_PERIOD_S` | `safety.tick_period_s` |
/// | `MINISAFE_MIN_COMMAND_INTERVAL_S` | `safety.min_command_interval_s` |
/// | `MINISAFE_BATTERY_LOW_PERCENT` | `safety.battery_low_percent` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MINISAFE_HAZARD_SOURCE") {
        match v.trim().to_ascii_lowercase().as_str() {
            "proximity" => cfg.safety.hazard_source = HazardSourceKind::Proximity,
            "posture" => cfg.safety.hazard_source = HazardSourceKind::Posture,
            _ => {}
        }
    }
    if let Some(v) = env_parse("MINISAFE_SOFT_DISTANCE_CM") {
        cfg.safety.soft_distance_cm = v;
    }
    if let Some(v) = env_parse("MINISAFE_HARD_DISTANCE_CM") {
        cfg.safety.hard_distance_cm = v;
    }
    if let Some(v) = env_parse("MINISAFE_TICK_PERIOD_S") {
        cfg.safety.tick_period_s = v;
    }
    if let Some(v) = env_parse("MINISAFE_MIN_COMMAND_INTERVAL_S") {
        cfg.safety.min_command_interval_s = v;
    }
    if let Some(v) = env_parse("MINISAFE_BATTERY_LOW_PERCENT") {
        cfg.safety.battery_low_percent = v;
    }
}

/// Save the config to disk, creating `~/.minisafe/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
