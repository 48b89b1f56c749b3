// Test orchestration error types and constants

use crate::error::{EmitterError, ErrorCode};
use log::error;
use std::fmt;

/// Audiometry error code constants
///
/// Error code range: 3001-3008
pub struct AudiometryErrorCodes {}

impl AudiometryErrorCodes {
    /// Tone emitter failed to play a presentation
    pub const EMITTER_FAILURE: i32 = 3001;

    /// No test is running
    pub const NO_ACTIVE_TEST: i32 = 3002;

    /// A test is already running
    pub const ALREADY_RUNNING: i32 = 3003;

    /// Retry requested while no presentation is waiting on the emitter
    pub const NOT_AWAITING_RETRY: i32 = 3004;

    /// Session finalized before every pair had a threshold
    pub const SESSION_INCOMPLETE: i32 = 3005;

    /// Session results were already handed to the result store
    pub const ALREADY_SAVED: i32 = 3006;

    /// Orchestrator mutex was poisoned
    pub const STATE_POISONED: i32 = 3007;

    /// Result store rejected the session
    pub const STORAGE: i32 = 3008;
}

/// Log an audiometry error with structured context
///
/// This function logs errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_audiometry_error(err: &AudiometryError, context: &str) {
    error!(
        "Audiometry error in {}: code={}, component=TestOrchestrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Test orchestration errors
///
/// Only genuine I/O and hardware failures are surfaced here; data quality
/// problems are resolved inside the engine with documented fallbacks.
///
/// Error code ranges: 3001-3008
#[derive(Debug, Clone, PartialEq)]
pub enum AudiometryError {
    /// Tone emitter failed to play; the presentation was not recorded
    EmitterFailure { source: EmitterError },

    /// No test is running
    NoActiveTest,

    /// A test is already running
    AlreadyRunning,

    /// Retry requested while no presentation is waiting on the emitter
    NotAwaitingRetry,

    /// Session finalized before every pair had a threshold
    SessionIncomplete { completed: usize, total: usize },

    /// Session results were already handed to the result store
    AlreadySaved,

    /// Orchestrator mutex was poisoned
    StatePoisoned,

    /// Result store rejected the session
    Storage { reason: String },
}

impl ErrorCode for AudiometryError {
    fn code(&self) -> i32 {
        match self {
            AudiometryError::EmitterFailure { .. } => AudiometryErrorCodes::EMITTER_FAILURE,
            AudiometryError::NoActiveTest => AudiometryErrorCodes::NO_ACTIVE_TEST,
            AudiometryError::AlreadyRunning => AudiometryErrorCodes::ALREADY_RUNNING,
            AudiometryError::NotAwaitingRetry => AudiometryErrorCodes::NOT_AWAITING_RETRY,
            AudiometryError::SessionIncomplete { .. } => AudiometryErrorCodes::SESSION_INCOMPLETE,
            AudiometryError::AlreadySaved => AudiometryErrorCodes::ALREADY_SAVED,
            AudiometryError::StatePoisoned => AudiometryErrorCodes::STATE_POISONED,
            AudiometryError::Storage { .. } => AudiometryErrorCodes::STORAGE,
        }
    }

    fn message(&self) -> String {
        match self {
            AudiometryError::EmitterFailure { source } => {
                format!("Tone emitter failure: {}", source.message())
            }
            AudiometryError::NoActiveTest => {
                "No test running. Call start_test() first.".to_string()
            }
            AudiometryError::AlreadyRunning => {
                "Test already running. Call stop_test() first.".to_string()
            }
            AudiometryError::NotAwaitingRetry => {
                "No failed presentation to retry".to_string()
            }
            AudiometryError::SessionIncomplete { completed, total } => {
                format!("Session incomplete: {} of {} pairs tested", completed, total)
            }
            AudiometryError::AlreadySaved => "Session results already saved".to_string(),
            AudiometryError::StatePoisoned => "Test orchestrator lock poisoned".to_string(),
            AudiometryError::Storage { reason } => format!("Result storage failed: {}", reason),
        }
    }
}

impl fmt::Display for AudiometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudiometryError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudiometryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AudiometryError::EmitterFailure { source } => Some(source),
            _ => None,
        }
    }
}

impl From<EmitterError> for AudiometryError {
    fn from(source: EmitterError) -> Self {
        AudiometryError::EmitterFailure { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audiometry_error_codes() {
        assert_eq!(
            AudiometryError::from(EmitterError::DeviceUnavailable).code(),
            AudiometryErrorCodes::EMITTER_FAILURE
        );
        assert_eq!(
            AudiometryError::NoActiveTest.code(),
            AudiometryErrorCodes::NO_ACTIVE_TEST
        );
        assert_eq!(
            AudiometryError::AlreadyRunning.code(),
            AudiometryErrorCodes::ALREADY_RUNNING
        );
        assert_eq!(
            AudiometryError::NotAwaitingRetry.code(),
            AudiometryErrorCodes::NOT_AWAITING_RETRY
        );
        assert_eq!(
            AudiometryError::SessionIncomplete {
                completed: 1,
                total: 10
            }
            .code(),
            AudiometryErrorCodes::SESSION_INCOMPLETE
        );
        assert_eq!(
            AudiometryError::AlreadySaved.code(),
            AudiometryErrorCodes::ALREADY_SAVED
        );
        assert_eq!(
            AudiometryError::StatePoisoned.code(),
            AudiometryErrorCodes::STATE_POISONED
        );
        assert_eq!(
            AudiometryError::Storage {
                reason: "disk full".to_string()
            }
            .code(),
            AudiometryErrorCodes::STORAGE
        );
    }

    #[test]
    fn test_audiometry_error_messages() {
        let err = AudiometryError::SessionIncomplete {
            completed: 3,
            total: 10,
        };
        assert_eq!(err.message(), "Session incomplete: 3 of 10 pairs tested");

        let err = AudiometryError::from(EmitterError::PlaybackFailed {
            reason: "device busy".to_string(),
        });
        assert_eq!(
            err.message(),
            "Tone emitter failure: Tone playback failed: device busy"
        );
    }

    #[test]
    fn test_emitter_failure_exposes_source() {
        use std::error::Error;

        let err = AudiometryError::from(EmitterError::DeviceUnavailable);
        assert!(err.source().is_some());
        assert!(AudiometryError::NoActiveTest.source().is_none());
    }
}
