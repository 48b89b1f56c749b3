// Calibration mapping - clinical dB HL to device output amplitude and back
//
// The forward mapping interpolates linearly between fixed (dB HL, amplitude)
// anchors, then scales by the device's per-frequency adjustment relative to
// the reference level. Inputs outside the anchor range clamp to the nearest
// anchor. Every function here is pure: no hardware, no shared state.

use crate::audiometry::scale::{Frequency, HearingLevel};
use crate::calibration::profile::CalibrationProfile;
use crate::calibration::store::CalibrationStore;
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Amplitude an uncorrected device needs for the reference tone
pub const DEFAULT_REFERENCE_LEVEL: f32 = 0.5;

/// Frequency whose adjustment stands in for frequencies without one
pub const FALLBACK_FREQUENCY: Frequency = Frequency::Hz1000;

/// (dB HL, amplitude) anchors, strictly increasing in both columns
const ANCHORS: [(i32, f32); 9] = [
    (0, 0.05),
    (10, 0.08),
    (20, 0.12),
    (30, 0.18),
    (40, 0.27),
    (50, 0.40),
    (60, 0.55),
    (70, 0.75),
    (80, 1.0),
];

/// Unadjusted amplitude for a dB HL value
pub fn interpolate_amplitude(db_hl: f32) -> f32 {
    let (first_db, first_amp) = ANCHORS[0];
    let (last_db, last_amp) = ANCHORS[ANCHORS.len() - 1];

    if db_hl.is_nan() || db_hl <= first_db as f32 {
        return first_amp;
    }
    if db_hl >= last_db as f32 {
        return last_amp;
    }

    for pair in ANCHORS.windows(2) {
        let (lo_db, lo_amp) = pair[0];
        let (hi_db, hi_amp) = pair[1];
        if db_hl == lo_db as f32 {
            return lo_amp;
        }
        if db_hl < hi_db as f32 {
            let t = (db_hl - lo_db as f32) / (hi_db - lo_db) as f32;
            return lo_amp + t * (hi_amp - lo_amp);
        }
    }

    last_amp
}

/// dB HL producing an unadjusted amplitude; inverse of `interpolate_amplitude`
pub fn interpolate_db(amplitude: f32) -> f32 {
    let (first_db, first_amp) = ANCHORS[0];
    let (last_db, last_amp) = ANCHORS[ANCHORS.len() - 1];

    if amplitude.is_nan() || amplitude <= first_amp {
        return first_db as f32;
    }
    if amplitude >= last_amp {
        return last_db as f32;
    }

    for pair in ANCHORS.windows(2) {
        let (lo_db, lo_amp) = pair[0];
        let (hi_db, hi_amp) = pair[1];
        if amplitude == lo_amp {
            return lo_db as f32;
        }
        if amplitude < hi_amp {
            let t = (amplitude - lo_amp) / (hi_amp - lo_amp);
            return lo_db as f32 + t * (hi_db - lo_db) as f32;
        }
    }

    last_db as f32
}

/// Scale factor a profile applies at a frequency
///
/// # Returns
/// * `Some(scale)` - Adjustment for the exact frequency, else for 1000 Hz
/// * `None` - No usable adjustment; amplitudes stay unadjusted
pub fn adjustment_scale(
    frequency: Frequency,
    profile: Option<&CalibrationProfile>,
    reference_level: f32,
) -> Option<f32> {
    if !(reference_level.is_finite() && reference_level > 0.0) {
        return None;
    }
    let profile = profile?;
    let adjustment = profile
        .adjustment(frequency)
        .or_else(|| profile.adjustment(FALLBACK_FREQUENCY))?;

    if adjustment.is_finite() && adjustment >= 0.0 {
        Some(adjustment / reference_level)
    } else {
        None
    }
}

/// Device amplitude in [0, 1] for a dB HL value at a frequency
pub fn db_to_amplitude(
    db_hl: f32,
    frequency: Frequency,
    profile: Option<&CalibrationProfile>,
) -> f32 {
    CalibrationMapping::with_reference(profile.cloned(), DEFAULT_REFERENCE_LEVEL)
        .db_to_amplitude(db_hl, frequency)
}

/// dB HL that would produce a device amplitude at a frequency
pub fn amplitude_to_db(
    amplitude: f32,
    frequency: Frequency,
    profile: Option<&CalibrationProfile>,
) -> f32 {
    CalibrationMapping::with_reference(profile.cloned(), DEFAULT_REFERENCE_LEVEL)
        .amplitude_to_db(amplitude, frequency)
}

/// Mapping bound to one calibration profile, read-only during a test
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMapping {
    profile: Option<CalibrationProfile>,
    reference_level: f32,
}

impl CalibrationMapping {
    /// Mapping with the default reference level
    pub fn new(profile: Option<CalibrationProfile>) -> Self {
        Self::with_reference(profile, DEFAULT_REFERENCE_LEVEL)
    }

    pub fn with_reference(profile: Option<CalibrationProfile>, reference_level: f32) -> Self {
        Self {
            profile,
            reference_level,
        }
    }

    /// Raw mapping without any device adjustment
    pub fn uncalibrated() -> Self {
        Self::new(None)
    }

    /// Mapping for the stored profile, or raw when it is missing or stale
    ///
    /// # Errors
    /// Propagates store read failures
    pub fn from_store(
        store: &dyn CalibrationStore,
        config: &CalibrationConfig,
        now_ms: u64,
    ) -> Result<Self, CalibrationError> {
        let profile = store.usable_profile(now_ms, config.max_age_ms())?;
        Ok(Self::with_reference(profile, config.reference_level))
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.profile.is_some()
    }

    pub fn db_to_amplitude(&self, db_hl: f32, frequency: Frequency) -> f32 {
        let amplitude = interpolate_amplitude(db_hl);
        match adjustment_scale(frequency, self.profile.as_ref(), self.reference_level) {
            Some(scale) => (amplitude * scale).clamp(0.0, 1.0),
            None => amplitude,
        }
    }

    /// Amplitude for a ladder level
    pub fn amplitude(&self, level: HearingLevel, frequency: Frequency) -> f32 {
        self.db_to_amplitude(level.db() as f32, frequency)
    }

    pub fn amplitude_to_db(&self, amplitude: f32, frequency: Frequency) -> f32 {
        let raw = match adjustment_scale(frequency, self.profile.as_ref(), self.reference_level) {
            Some(scale) if scale > 0.0 => amplitude / scale,
            // A zero adjustment silences every level; the quietest is the only answer
            Some(_) => return ANCHORS[0].0 as f32,
            None => amplitude,
        };
        interpolate_db(raw)
    }

    /// Nearest ladder level for a device amplitude
    pub fn amplitude_to_level(&self, amplitude: f32, frequency: Frequency) -> HearingLevel {
        HearingLevel::nearest(self.amplitude_to_db(amplitude, frequency))
    }
}

impl Default for CalibrationMapping {
    fn default() -> Self {
        Self::uncalibrated()
    }
}
