use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::logging::LogConfig;
use crate::models::WorkoutType;
use crate::protocol::{LadderRecording, ProtocolSpec, DEFAULT_LADDER_REP_GUARD};
use crate::timer::DEFAULT_REDELIVERY_DELAY_MS;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Record store location
    pub storage: StorageSettings,

    /// Per-protocol overrides of set count and rest
    #[serde(default)]
    pub protocols: ProtocolOverrides,

    /// Session behaviour
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: AppConfig::default_data_dir().join("workouts.db"),
        }
    }
}

/// Optional override of a protocol's built-in shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolOverride {
    pub total_units: Option<usize>,
    pub rest_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolOverrides {
    #[serde(default)]
    pub max_day: ProtocolOverride,
    #[serde(default)]
    pub sub_max_volume: ProtocolOverride,
    #[serde(default)]
    pub ladder_volume: ProtocolOverride,
}

impl ProtocolOverrides {
    pub fn for_type(&self, workout_type: WorkoutType) -> &ProtocolOverride {
        match workout_type {
            WorkoutType::MaxDay => &self.max_day,
            WorkoutType::SubMaxVolume => &self.sub_max_volume,
            WorkoutType::LadderVolume => &self.ladder_volume,
        }
    }
}

/// What happens to an unfinished workout when the user leaves it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonPolicy {
    /// Delete the record without asking
    DiscardSilently,
    /// Ask before deleting once any set has been done; delete untouched records
    #[default]
    ConfirmIfStarted,
    /// Keep partial progress as an unfinished record
    KeepPartial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub abandon_policy: AbandonPolicy,

    pub ladder_recording: LadderRecording,

    /// Rung count after which a ladder confirms itself
    pub ladder_rep_guard: u32,

    /// Expose the "skip rest" shortcut
    pub fast_forward_enabled: bool,

    /// Seconds left on the rest after skipping
    pub fast_forward_seconds: u32,

    /// Rest timer tick period
    pub tick_interval_ms: u64,

    /// Delay before an already elapsed rest completes after resume
    pub redelivery_delay_ms: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            abandon_policy: AbandonPolicy::default(),
            ladder_recording: LadderRecording::default(),
            ladder_rep_guard: DEFAULT_LADDER_REP_GUARD,
            fast_forward_enabled: false,
            fast_forward_seconds: 5,
            tick_interval_ms: 10,
            redelivery_delay_ms: DEFAULT_REDELIVERY_DELAY_MS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            storage: StorageSettings::default(),
            protocols: ProtocolOverrides::default(),
            session: SessionSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// `~/.pullup-mastery`
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pullup-mastery")
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %config_path.display(),
                    error = %e,
                    "Config not loaded, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Save configuration to default location
    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    /// Built-in protocol for `workout_type` with this configuration applied
    pub fn protocol_spec(&self, workout_type: WorkoutType, sub_max_target: u32) -> ProtocolSpec {
        let mut spec = ProtocolSpec::for_type(workout_type, sub_max_target);

        let overrides = self.protocols.for_type(workout_type);
        if let Some(total_units) = overrides.total_units {
            spec = spec.with_total_units(total_units);
        }
        if let Some(rest_seconds) = overrides.rest_seconds {
            spec = spec.with_rest_seconds(rest_seconds);
        }

        spec.with_ladder_recording(self.session.ladder_recording)
            .with_ladder_rep_guard(self.session.ladder_rep_guard)
    }

    /// Fast-forward target when the shortcut is enabled
    pub fn fast_forward_seconds(&self) -> Option<u32> {
        self.session
            .fast_forward_enabled
            .then_some(self.session.fast_forward_seconds)
    }

    pub fn redelivery_delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.session.redelivery_delay_ms.max(0))
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.session.tick_interval_ms.max(1))
    }
}
