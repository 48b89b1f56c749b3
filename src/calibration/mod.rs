// Calibration module - dB HL to device amplitude mapping and profile storage
//
// This module provides three components:
// 1. mapping: Pure dB HL <-> amplitude conversion with per-frequency adjustment
// 2. profile: CalibrationProfile and its CalibrationStatus against the current device
// 3. store: CalibrationStore contract with JSON file and in-memory implementations
//
// At test start the stored profile is checked for staleness; a usable profile
// drives the CalibrationMapping for the whole session, otherwise the raw
// anchor interpolation is used.

pub mod mapping;
pub mod profile;
pub mod store;

pub use mapping::{
    amplitude_to_db, db_to_amplitude, CalibrationMapping, DEFAULT_REFERENCE_LEVEL,
};
pub use profile::{CalibrationProfile, CalibrationStatus, DeviceInfo, FrequencyAdjustment};
pub use store::{CalibrationStore, JsonFileCalibrationStore, MemoryCalibrationStore};
