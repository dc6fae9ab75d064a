use crate::allocation::PolicyKind;
use crate::control::sequencer::SequencerSettings;
use crate::occupancy::OccupancyConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_COMMAND_ADDR: &str = "127.0.0.1:7070";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_ROTATION_SETTLE_MS: u64 = 1000;
pub const DEFAULT_BARRIER_HOLD_MS: u64 = 3000;
pub const DEFAULT_BEAM_DEBOUNCE_MS: u64 = 50;
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_DISPLAY_COLUMNS: usize = 16;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub bays: BaysSection,
    #[serde(default)]
    pub control: Option<ControlSection>,
    #[serde(default)]
    pub command: Option<CommandSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub simulation: Option<SimulationSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BaysSection {
    /// Platform angle for each bay, in bay order.
    pub angles: Vec<i32>,
    pub occupied_threshold_cm: Option<f32>,
    pub max_range_cm: Option<f32>,
    pub debounce_samples: Option<u8>,
    pub samples_per_poll: Option<u8>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ControlSection {
    pub poll_interval_ms: Option<u64>,
    pub rotation_settle_ms: Option<u64>,
    pub barrier_hold_ms: Option<u64>,
    pub beam_debounce_ms: Option<u64>,
    pub session_timeout_ms: Option<u64>,
    pub min_angle: Option<i32>,
    pub max_angle: Option<i32>,
    pub allocation: Option<String>,
    pub display_columns: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommandSection {
    pub listen_addr: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationSection {
    pub arrival_interval_secs: Option<u64>,
    pub dwell_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let angles = &self.bays.angles;
        if angles.is_empty() {
            return Err(ConfigError::Invalid("[bays].angles must not be empty".into()));
        }
        let mut seen = HashSet::with_capacity(angles.len());
        for angle in angles {
            if !seen.insert(*angle) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate platform angle {angle} in [bays].angles"
                )));
            }
        }

        let occupancy = self.occupancy_config();
        if !(occupancy.occupied_threshold_cm > 0.0) || !(occupancy.max_range_cm > 0.0) {
            return Err(ConfigError::Invalid(
                "distance thresholds must be positive".into(),
            ));
        }
        if occupancy.occupied_threshold_cm > occupancy.max_range_cm {
            return Err(ConfigError::Invalid(format!(
                "occupied threshold {}cm exceeds max range {}cm",
                occupancy.occupied_threshold_cm, occupancy.max_range_cm
            )));
        }

        let (min_angle, max_angle) = self.angle_limits();
        if min_angle > max_angle {
            return Err(ConfigError::Invalid(format!(
                "min_angle {min_angle} is greater than max_angle {max_angle}"
            )));
        }

        self.allocation_policy()?;
        Ok(())
    }

    pub fn bay_angles(&self) -> &[i32] {
        &self.bays.angles
    }

    pub fn occupancy_config(&self) -> OccupancyConfig {
        let defaults = OccupancyConfig::default();
        OccupancyConfig {
            occupied_threshold_cm: self
                .bays
                .occupied_threshold_cm
                .unwrap_or(defaults.occupied_threshold_cm),
            max_range_cm: self.bays.max_range_cm.unwrap_or(defaults.max_range_cm),
            debounce_samples: self
                .bays
                .debounce_samples
                .unwrap_or(defaults.debounce_samples)
                .max(1),
            samples_per_poll: self
                .bays
                .samples_per_poll
                .unwrap_or(defaults.samples_per_poll)
                .max(1),
        }
    }

    fn control(&self) -> ControlSection {
        self.control.clone().unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.control()
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn beam_debounce_ms(&self) -> u64 {
        self.control()
            .beam_debounce_ms
            .unwrap_or(DEFAULT_BEAM_DEBOUNCE_MS)
    }

    /// Returns (min, max) override angle limits (default: 0..=180)
    pub fn angle_limits(&self) -> (i32, i32) {
        let control = self.control();
        (
            control.min_angle.unwrap_or(0),
            control.max_angle.unwrap_or(180),
        )
    }

    pub fn sequencer_settings(&self) -> SequencerSettings {
        let control = self.control();
        let (min_angle, max_angle) = self.angle_limits();
        SequencerSettings {
            rotation_settle_ms: control
                .rotation_settle_ms
                .unwrap_or(DEFAULT_ROTATION_SETTLE_MS),
            barrier_hold_ms: control.barrier_hold_ms.unwrap_or(DEFAULT_BARRIER_HOLD_MS),
            session_timeout_ms: control
                .session_timeout_ms
                .unwrap_or(DEFAULT_SESSION_TIMEOUT_MS),
            min_angle,
            max_angle,
        }
    }

    pub fn allocation_policy(&self) -> Result<PolicyKind, ConfigError> {
        match self.control().allocation.as_deref() {
            None => Ok(PolicyKind::FirstFree),
            Some(name) => PolicyKind::from_name(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown allocation policy: {name}"))),
        }
    }

    pub fn display_columns(&self) -> usize {
        self.control()
            .display_columns
            .unwrap_or(DEFAULT_DISPLAY_COLUMNS)
            .max(1)
    }

    /// Returns the command listener address (default: 127.0.0.1:7070)
    pub fn command_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self
            .command
            .as_ref()
            .and_then(|c| c.listen_addr.as_deref())
            .unwrap_or(DEFAULT_COMMAND_ADDR);
        raw.parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid command listen_addr: {raw}")))
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn arrival_interval(&self) -> Duration {
        let secs = self
            .simulation
            .as_ref()
            .and_then(|s| s.arrival_interval_secs)
            .unwrap_or(20);
        Duration::from_secs(secs)
    }

    pub fn dwell_time(&self) -> Duration {
        let secs = self
            .simulation
            .as_ref()
            .and_then(|s| s.dwell_secs)
            .unwrap_or(45);
        Duration::from_secs(secs)
    }
}
