//! Configuration management for test protocol tuning
//!
//! This module provides runtime configuration loading from JSON files so the
//! search protocol, session timing, and calibration policy can be adjusted
//! without recompilation. Every section has clinical defaults that apply when
//! the file is missing, unreadable, or only partially specified.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::audiometry::scale::{Ear, HearingLevel};

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub session: SessionConfig,
    pub calibration: CalibrationConfig,
}

/// Threshold search protocol parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Level of the first familiarization tone (dB HL)
    pub starting_level_db: i32,
    /// Raise applied after a missed familiarization tone
    pub familiarization_step_db: u32,
    /// Drop applied after each heard descending tone
    pub descending_step_db: u32,
    /// Raise applied after each missed tone outside familiarization
    pub ascending_step_db: u32,
    /// Positive responses needed at one level to confirm a threshold
    pub required_positive: u8,
    /// Responses needed at one level before confirmation is considered
    pub min_responses: u8,
    /// Responses at one level after which the level is accepted regardless
    pub max_responses_per_level: u8,
    /// Hard cap on presentations for one (ear, frequency) pair
    pub max_presentations: u16,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            starting_level_db: 40,
            familiarization_step_db: 20,
            descending_step_db: 10,
            ascending_step_db: 5,
            required_positive: 2,
            min_responses: 3,
            max_responses_per_level: 5,
            max_presentations: 20,
        }
    }
}

impl SearchConfig {
    /// Starting level snapped onto the hearing level ladder
    pub fn starting_level(&self) -> HearingLevel {
        HearingLevel::nearest(self.starting_level_db as f32)
    }
}

/// Session timing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time allowed for a response before "not heard" is recorded
    pub response_timeout_ms: u64,
    /// Length of each tone
    pub tone_duration_ms: u64,
    /// Silence before every tone after the first
    pub inter_tone_delay_ms: u64,
    /// Ear tested first when the caller does not choose
    pub starting_ear: Ear,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5000,
            tone_duration_ms: 1000,
            inter_tone_delay_ms: 500,
            starting_ear: Ear::Right,
        }
    }
}

impl SessionConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Calibration mapping and staleness policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Amplitude an uncorrected device needs for the reference tone
    pub reference_level: f32,
    /// Age after which recalibration is recommended
    pub max_age_days: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            reference_level: 0.5,
            max_age_days: 30,
        }
    }
}

impl CalibrationConfig {
    pub fn max_age_ms(&self) -> u64 {
        u64::from(self.max_age_days) * 24 * 60 * 60 * 1000
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults when the file does not exist or
    /// the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.search.starting_level_db, 40);
        assert_eq!(config.search.max_presentations, 20);
        assert_eq!(config.session.response_timeout_ms, 5000);
        assert_eq!(config.session.starting_ear, Ear::Right);
        assert_eq!(config.calibration.reference_level, 0.5);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"session": {"response_timeout_ms": 3000}}"#).unwrap();
        assert_eq!(parsed.session.response_timeout_ms, 3000);
        assert_eq!(parsed.session.tone_duration_ms, 1000);
        assert_eq!(parsed.search, SearchConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/audiometry_config.json");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_starting_level_snaps_to_ladder() {
        let config = SearchConfig {
            starting_level_db: 42,
            ..SearchConfig::default()
        };
        assert_eq!(config.starting_level().db(), 40);
        assert_eq!(CalibrationConfig::default().max_age_ms(), 2_592_000_000);
    }
}
