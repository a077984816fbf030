//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `hestia.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use chrono::NaiveTime;
use serde::Deserialize;

use hestia_domain::sun::GeoLocation;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Geographic location used for sunrise/sunset computation.
    pub location: LocationConfig,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
    /// Room definitions.
    pub rooms: Vec<RoomConfig>,
    /// Shutter actuators.
    pub shutters: Vec<ShutterConfig>,
    /// On/off actuators.
    pub switches: Vec<SwitchConfig>,
    /// Time triggers.
    pub triggers: Vec<TriggerConfig>,
}

/// Geographic location; solar triggers stay inert without one.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationConfig {
    #[must_use]
    pub fn geo(&self) -> Option<GeoLocation> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Scheduler tick cadence.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between trigger checks.
    pub tick_seconds: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Enable the virtual/demo integration.
    pub virtual_enabled: bool,
}

/// One room.
#[derive(Debug, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default = "default_floor")]
    pub floor: String,
}

fn default_floor() -> String {
    "ground".to_string()
}

/// One roller shutter actuator and its telemetry points.
#[derive(Debug, Deserialize)]
pub struct ShutterConfig {
    pub name: String,
    /// Room name; must match a `[[rooms]]` entry.
    pub room: Option<String>,
    /// Data point for absolute level commands and reports.
    pub level_point: String,
    /// Data point for tri-state movement reports.
    pub movement_point: Option<String>,
    /// Window-handle sensors attached to this shutter's window.
    #[serde(default)]
    pub handle_points: Vec<HandlePointConfig>,
    /// Previously learned full-open travel time.
    pub ms_to_fully_open: Option<u64>,
    /// Previously learned full-close travel time.
    pub ms_to_fully_close: Option<u64>,
}

/// One window-handle sensor point.
#[derive(Debug, Deserialize)]
pub struct HandlePointConfig {
    pub point: String,
    pub sensor: String,
}

/// One on/off actuator.
#[derive(Debug, Deserialize)]
pub struct SwitchConfig {
    pub name: String,
    pub room: Option<String>,
    /// Data point for on/off commands and reports.
    pub state_point: String,
}

/// One time trigger and the action it performs.
#[derive(Debug, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub kind: TriggerKindConfig,
    /// Fixed-time triggers only.
    pub hour: Option<u32>,
    /// Fixed-time triggers only.
    pub minute: Option<u32>,
    /// Minutes relative to the solar event (negative = earlier).
    #[serde(default)]
    pub offset_minutes: i64,
    /// Maximum cloud drift in minutes at full overcast.
    pub cloud_minutes: Option<i64>,
    /// Sunrise triggers never fire before this local time (`HH:MM`).
    pub earliest: Option<String>,
    /// Sunset triggers never fire after this local time (`HH:MM`).
    pub latest: Option<String>,
    pub action: ActionConfig,
}

/// Trigger flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKindConfig {
    FixedTime,
    Sunrise,
    Sunset,
}

/// What a trigger does when it fires.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ActionConfig {
    /// Move every shutter of `floor` (or the whole house) to `level`.
    SetAllShutters { level: u8, floor: Option<String> },
}

impl TriggerConfig {
    /// Parse a `HH:MM` clamp field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the value is not `HH:MM`.
    pub fn parse_clamp(value: &str) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(value, "%H:%M")
            .map_err(|_| ConfigError::Validation(format!("invalid clamp time '{value}'")))
    }
}

impl Config {
    /// Load configuration from `hestia.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// semantic check fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hestia.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HESTIA_LATITUDE") {
            if let Ok(latitude) = val.parse() {
                self.location.latitude = Some(latitude);
            }
        }
        if let Ok(val) = std::env::var("HESTIA_LONGITUDE") {
            if let Ok(longitude) = val.parse() {
                self.location.longitude = Some(longitude);
            }
        }
        if let Ok(val) = std::env::var("HESTIA_TICK_SECONDS") {
            if let Ok(seconds) = val.parse() {
                self.scheduler.tick_seconds = seconds;
            }
        }
        if let Ok(val) = std::env::var("HESTIA_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_seconds == 0 {
            return Err(ConfigError::Validation(
                "scheduler.tick_seconds must be non-zero".to_string(),
            ));
        }
        if let Some(latitude) = self.location.latitude {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(ConfigError::Validation(format!(
                    "latitude {latitude} out of range"
                )));
            }
        }
        if let Some(longitude) = self.location.longitude {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(ConfigError::Validation(format!(
                    "longitude {longitude} out of range"
                )));
            }
        }
        for trigger in &self.triggers {
            if trigger.kind == TriggerKindConfig::FixedTime
                && (trigger.hour.is_none() || trigger.minute.is_none())
            {
                return Err(ConfigError::Validation(format!(
                    "fixed-time trigger '{}' needs hour and minute",
                    trigger.name
                )));
            }
            if let Some(clamp) = &trigger.earliest {
                TriggerConfig::parse_clamp(clamp)?;
            }
            if let Some(clamp) = &trigger.latest {
                TriggerConfig::parse_clamp(clamp)?;
            }
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_seconds: 60 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hestiad=info,hestia=info".to_string(),
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
