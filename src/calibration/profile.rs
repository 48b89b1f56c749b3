// CalibrationProfile - per-device output adjustments and staleness status
//
// A profile is written by an external calibration procedure and only read
// while testing. Whether it may still be trusted is reported as a
// `CalibrationStatus`, never as an error.

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::Frequency;
use crate::error::CalibrationError;

/// Output adjustment measured at one frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAdjustment {
    pub frequency: Frequency,
    /// Amplitude the device needed for the reference tone
    pub adjustment: f32,
}

/// Stored calibration for one device and headphone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub device_identifier: String,
    pub headphone_label: String,
    /// At most one entry per frequency, in frequency order
    #[serde(default)]
    pub adjustments: Vec<FrequencyAdjustment>,
    /// When the calibration was performed (ms since Unix epoch)
    pub calibrated_at_ms: u64,
    /// Set when the user explicitly invalidated this calibration
    #[serde(default)]
    pub reset: bool,
}

impl CalibrationProfile {
    pub fn new(
        device_identifier: impl Into<String>,
        headphone_label: impl Into<String>,
        calibrated_at_ms: u64,
    ) -> Self {
        Self {
            device_identifier: device_identifier.into(),
            headphone_label: headphone_label.into(),
            adjustments: Vec::new(),
            calibrated_at_ms,
            reset: false,
        }
    }

    /// Add or replace the adjustment for a frequency
    ///
    /// # Errors
    /// `CalibrationError::InvalidAdjustment` for negative or non-finite values
    pub fn with_adjustment(
        mut self,
        frequency: Frequency,
        adjustment: f32,
    ) -> Result<Self, CalibrationError> {
        validate_adjustment(frequency, adjustment)?;

        let entry = FrequencyAdjustment {
            frequency,
            adjustment,
        };
        match self
            .adjustments
            .binary_search_by_key(&frequency, |a| a.frequency)
        {
            Ok(index) => self.adjustments[index] = entry,
            Err(index) => self.adjustments.insert(index, entry),
        }
        Ok(self)
    }

    /// Adjustment recorded for exactly this frequency
    pub fn adjustment(&self, frequency: Frequency) -> Option<f32> {
        self.adjustments
            .iter()
            .find(|a| a.frequency == frequency)
            .map(|a| a.adjustment)
    }

    /// Check every stored adjustment, e.g. after loading from disk
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.adjustments
            .iter()
            .try_for_each(|a| validate_adjustment(a.frequency, a.adjustment))
    }

    /// Explicitly invalidate this calibration
    pub fn mark_reset(&mut self) {
        self.reset = true;
    }
}

fn validate_adjustment(frequency: Frequency, value: f32) -> Result<(), CalibrationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CalibrationError::InvalidAdjustment { frequency, value })
    }
}

/// Device the engine is currently running on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_identifier: String,
    /// Connected headphone, when the platform can tell
    pub headphone_label: Option<String>,
}

impl DeviceInfo {
    pub fn new(device_identifier: impl Into<String>) -> Self {
        Self {
            device_identifier: device_identifier.into(),
            headphone_label: None,
        }
    }

    pub fn with_headphone(mut self, label: impl Into<String>) -> Self {
        self.headphone_label = Some(label.into());
        self
    }

    /// Whether a profile was recorded on this device
    pub fn matches(&self, profile: &CalibrationProfile) -> bool {
        self.device_identifier == profile.device_identifier
    }
}

/// Whether testing may rely on the stored calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStatus {
    /// Profile matches this device and is recent
    Calibrated,
    /// No profile stored
    NeedsCalibration,
    /// Profile was reset or belongs to another device
    NeedsRecalibration,
    /// Profile usable but old or recorded with other headphones
    RecommendRecalibration,
}

impl CalibrationStatus {
    /// Evaluate a stored profile against the current device
    ///
    /// # Arguments
    /// * `profile` - Stored profile, if any
    /// * `device` - Device the test would run on
    /// * `now_ms` - Current time (ms since Unix epoch)
    /// * `max_age_ms` - Age after which recalibration is recommended
    pub fn evaluate(
        profile: Option<&CalibrationProfile>,
        device: &DeviceInfo,
        now_ms: u64,
        max_age_ms: u64,
    ) -> Self {
        let Some(profile) = profile else {
            return CalibrationStatus::NeedsCalibration;
        };

        if profile.reset || !device.matches(profile) {
            return CalibrationStatus::NeedsRecalibration;
        }

        let headphone_changed = device
            .headphone_label
            .as_ref()
            .is_some_and(|label| *label != profile.headphone_label);
        let age_ms = now_ms.saturating_sub(profile.calibrated_at_ms);

        if headphone_changed || age_ms > max_age_ms {
            CalibrationStatus::RecommendRecalibration
        } else {
            CalibrationStatus::Calibrated
        }
    }

    /// Whether the stored profile may drive the amplitude mapping
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            CalibrationStatus::Calibrated | CalibrationStatus::RecommendRecalibration
        )
    }
}
