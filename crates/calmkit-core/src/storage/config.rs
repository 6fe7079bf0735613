//! TOML-based application configuration.
//!
//! Holds the defaults the engine is constructed from:
//! - Countdown length
//! - Breathing pattern and rounds
//! - Session monitor thresholds
//! - Routine sequencing behaviour
//!
//! Configuration is stored at `<data dir>/config.toml`. Nothing reads it
//! implicitly; hosts load a `Config` and pass the derived values into
//! constructors.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::data_dir;
use crate::error::ConfigError;
use crate::routine::SequencerConfig;
use crate::timer::{BreathingPattern, MonitorConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownConfig {
    #[serde(default = "default_countdown_secs")]
    pub default_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathingConfig {
    #[serde(default = "default_pattern")]
    pub pattern: BreathingPattern,
    /// Full cycles per session. 0 breathes until stopped.
    #[serde(default)]
    pub rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineConfig {
    #[serde(default = "default_true")]
    pub auto_advance: bool,
    #[serde(default = "default_true")]
    pub auto_start_next: bool,
    #[serde(default = "default_grace_delay_secs")]
    pub grace_delay_secs: f64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub breathing: BreathingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub routine: RoutineConfig,
}

fn default_countdown_secs() -> u32 {
    300
}
fn default_pattern() -> BreathingPattern {
    BreathingPattern::Box
}
fn default_true() -> bool {
    true
}
fn default_grace_delay_secs() -> f64 {
    2.0
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            default_secs: default_countdown_secs(),
        }
    }
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            rounds: 0,
        }
    }
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            auto_advance: true,
            auto_start_next: true,
            grace_delay_secs: default_grace_delay_secs(),
        }
    }
}

/// Longest accepted pause between routine steps.
pub const MAX_GRACE_DELAY_SECS: f64 = 86_400.0;

/// Leaf keys that accept `none` to clear them.
const OPTIONAL_KEYS: &[&str] = &["monitor.session_limit_secs"];

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn coerce(key: &str, existing: &serde_json::Value, value: &str) -> Result<serde_json::Value, String> {
        let value = value.trim();
        if OPTIONAL_KEYS.contains(&key) {
            return if value.is_empty() || value.eq_ignore_ascii_case("none") {
                Ok(serde_json::Value::Null)
            } else {
                Self::parse_number(value)
            };
        }
        Ok(match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|_| format!("expected true or false, got '{value}'"))?,
            ),
            serde_json::Value::Number(_) => Self::parse_number(value)?,
            serde_json::Value::Array(_) => {
                if value.starts_with('[') {
                    serde_json::from_str(value).map_err(|e| e.to_string())?
                } else {
                    let items = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(Self::parse_number)
                        .collect::<Result<Vec<_>, _>>()?;
                    serde_json::Value::Array(items)
                }
            }
            serde_json::Value::Object(_) => serde_json::from_str(value).map_err(|e| e.to_string())?,
            _ => serde_json::Value::String(value.into()),
        })
    }

    fn parse_number(value: &str) -> Result<serde_json::Value, String> {
        if let Ok(n) = value.parse::<u64>() {
            Ok(serde_json::Value::Number(n.into()))
        } else if let Ok(n) = value.parse::<f64>() {
            serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("cannot parse '{value}' as number"))
        } else {
            Err(format!("cannot parse '{value}' as number"))
        }
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let Some((parent_path, leaf)) = key.rsplit_once('.') else {
            return Err(unknown());
        };

        let mut current = root;
        for part in parent_path.split('.') {
            current = current.get_mut(part).ok_or_else(unknown)?;
        }
        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).cloned().ok_or_else(unknown)?;
        let new_value = Self::coerce(key, &existing, value).map_err(|message| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            }
        })?;
        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    fn collect_keys(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let path = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    Self::collect_keys(&path, v, out);
                }
            }
            serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    /// Default location, `<data dir>/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::DataDir(e.to_string()))
    }

    /// Load from the default location, writing defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if no file exists.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                if let Err(e) = cfg.monitor.validate() {
                    warn!(path = %path.display(), error = %e, "monitor thresholds ignored");
                }
                debug!(path = %path.display(), "config loaded");
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, coercing `value` to the
    /// key's type. The change is in memory only; call `save` to persist.
    ///
    /// # Errors
    ///
    /// `UnknownKey` for keys that don't exist and `InvalidValue` when the
    /// value cannot be coerced or leaves the config inconsistent.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.monitor.validate().map_err(|e| invalid(e.to_string()))?;
        let grace = updated.routine.grace_delay_secs;
        if !(0.0..=MAX_GRACE_DELAY_SECS).contains(&grace) {
            return Err(invalid(format!(
                "grace delay must be between 0 and {MAX_GRACE_DELAY_SECS} seconds"
            )));
        }
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            Self::collect_keys("", &json, &mut out);
        }
        out.sort();
        out
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        // NaN passes through `clamp` and casts to 0.
        let grace = self.routine.grace_delay_secs.clamp(0.0, MAX_GRACE_DELAY_SECS);
        SequencerConfig {
            auto_advance: self.routine.auto_advance,
            auto_start_next: self.routine.auto_start_next,
            grace_delay_ms: (grace * 1000.0).round() as u64,
        }
    }

    /// Monitor thresholds, or none at all when the stored ones are invalid.
    pub fn monitor_config(&self) -> MonitorConfig {
        match self.monitor.validate() {
            Ok(()) => self.monitor.clone(),
            Err(_) => MonitorConfig::default(),
        }
    }

    pub fn breathing_pattern(&self) -> BreathingPattern {
        self.breathing.pattern
    }

    /// `None` breathes until stopped.
    pub fn breathing_rounds(&self) -> Option<u32> {
        (self.breathing.rounds > 0).then_some(self.breathing.rounds)
    }
}
