//! Configuration for the device analytics agent.

use crate::core::insights::InsightConfig;
use crate::core::kpi::KpiThresholds;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
///
/// Everything here is an init-time setting; only the window length is
/// expected to change while the engine runs (via
/// [`crate::engine::AnalyticsEngine::set_window_minutes`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Analysis window length in minutes.
    pub window_minutes: u32,

    /// Minimum interval between recompute passes (milliseconds).
    pub update_throttle_ms: u64,

    /// Minimum interval between render passes (milliseconds).
    pub render_interval_ms: u64,

    /// Inter-arrival delay treated as a feed gap (milliseconds).
    pub gap_threshold_ms: i64,

    /// Per-indicator significance thresholds for downstream notification.
    pub thresholds: KpiThresholds,

    /// Insight detector settings.
    pub insights: InsightConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            update_throttle_ms: 2000,
            render_interval_ms: 3000,
            gap_threshold_ms: 10_000,
            thresholds: KpiThresholds::default(),
            insights: InsightConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("device-analytics-agent")
            .join("config.json")
    }

    /// Reject settings the engine must never see.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_minutes == 0 {
            return Err(ConfigError::InvalidWindow(self.window_minutes));
        }
        if self.update_throttle_ms == 0 || self.render_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.gap_threshold_ms <= 0 {
            return Err(ConfigError::InvalidGapThreshold(self.gap_threshold_ms));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidWindow(u32),
    InvalidInterval,
    InvalidGapThreshold(i64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidWindow(m) => {
                write!(f, "window length must be positive, got {m} minutes")
            }
            ConfigError::InvalidInterval => write!(f, "throttle intervals must be positive"),
            ConfigError::InvalidGapThreshold(ms) => {
                write!(f, "gap threshold must be positive, got {ms} ms")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_minutes, 15);
        assert_eq!(config.update_throttle_ms, 2000);
        assert_eq!(config.render_interval_ms, 3000);
        assert_eq!(config.gap_threshold_ms, 10_000);
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = Config {
            window_minutes: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindow(0))
        ));
    }

    #[test]
    fn test_nonpositive_gap_threshold_rejected() {
        let config = Config {
            gap_threshold_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.window_minutes, config.window_minutes);
        assert_eq!(parsed.thresholds.avg_kw, config.thresholds.avg_kw);
        assert_eq!(parsed.insights.pf_threshold, config.insights.pf_threshold);
    }
}
