// Calibration persistence - store contract plus JSON file and in-memory stores
//
// The test engine only ever reads from a store. Saving and resetting belong
// to the calibration procedure that lives outside this crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::calibration::profile::{CalibrationProfile, CalibrationStatus, DeviceInfo};
use crate::error::{log_calibration_error, CalibrationError};

/// Persistence contract for calibration profiles
pub trait CalibrationStore: Send + Sync {
    /// Load the stored profile, if any
    fn load(&self) -> Result<Option<CalibrationProfile>, CalibrationError>;

    /// Store a profile, replacing any previous one
    fn save(&self, profile: &CalibrationProfile) -> Result<(), CalibrationError>;

    /// Device this store is evaluated against
    fn current_device(&self) -> &DeviceInfo;

    /// Whether a profile was recorded on the current device
    fn is_current_device(&self, profile: &CalibrationProfile) -> bool {
        self.current_device().matches(profile)
    }

    /// Explicitly invalidate the stored profile
    ///
    /// # Errors
    /// `CalibrationError::NotFound` if nothing is stored
    fn reset(&self) -> Result<(), CalibrationError> {
        let mut profile = self.load()?.ok_or(CalibrationError::NotFound)?;
        profile.mark_reset();
        self.save(&profile)
    }

    /// Status of the stored profile for the current device
    fn status(&self, now_ms: u64, max_age_ms: u64) -> Result<CalibrationStatus, CalibrationError> {
        let profile = self.load()?;
        Ok(CalibrationStatus::evaluate(
            profile.as_ref(),
            self.current_device(),
            now_ms,
            max_age_ms,
        ))
    }

    /// Profile the amplitude mapping should use, if the status allows it
    fn usable_profile(
        &self,
        now_ms: u64,
        max_age_ms: u64,
    ) -> Result<Option<CalibrationProfile>, CalibrationError> {
        let profile = self.load()?;
        let status = CalibrationStatus::evaluate(
            profile.as_ref(),
            self.current_device(),
            now_ms,
            max_age_ms,
        );
        if status.is_usable() {
            Ok(profile)
        } else {
            log::warn!("[Calibration] Stored profile not usable ({:?}); using raw mapping", status);
            Ok(None)
        }
    }
}

/// Profile stored as a JSON document on disk
pub struct JsonFileCalibrationStore {
    path: PathBuf,
    device: DeviceInfo,
}

impl JsonFileCalibrationStore {
    pub fn new(path: impl Into<PathBuf>, device: DeviceInfo) -> Self {
        Self {
            path: path.into(),
            device,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for JsonFileCalibrationStore {
    fn load(&self) -> Result<Option<CalibrationProfile>, CalibrationError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                let err = CalibrationError::from(err);
                log_calibration_error(&err, "load_calibration");
                return Err(err);
            }
        };

        let profile: CalibrationProfile = serde_json::from_str(&contents).map_err(|err| {
            let err = CalibrationError::from(err);
            log_calibration_error(&err, "load_calibration");
            err
        })?;
        profile.validate()?;

        log::info!("[Calibration] Loaded profile from {:?}", self.path);
        Ok(Some(profile))
    }

    fn save(&self, profile: &CalibrationProfile) -> Result<(), CalibrationError> {
        profile.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(profile)?;
        fs::write(&self.path, json).inspect_err(|err| {
            log::error!("[Calibration] Failed to write {:?}: {}", self.path, err);
        })?;
        Ok(())
    }

    fn current_device(&self) -> &DeviceInfo {
        &self.device
    }
}

/// Volatile store for tests and tooling
pub struct MemoryCalibrationStore {
    profile: RwLock<Option<CalibrationProfile>>,
    device: DeviceInfo,
}

impl MemoryCalibrationStore {
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            profile: RwLock::new(None),
            device,
        }
    }

    pub fn with_profile(device: DeviceInfo, profile: CalibrationProfile) -> Self {
        Self {
            profile: RwLock::new(Some(profile)),
            device,
        }
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn load(&self) -> Result<Option<CalibrationProfile>, CalibrationError> {
        let guard = self
            .profile
            .read()
            .map_err(|_| CalibrationError::StatePoisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, profile: &CalibrationProfile) -> Result<(), CalibrationError> {
        profile.validate()?;
        let mut guard = self
            .profile
            .write()
            .map_err(|_| CalibrationError::StatePoisoned)?;
        *guard = Some(profile.clone());
        Ok(())
    }

    fn current_device(&self) -> &DeviceInfo {
        &self.device
    }
}
