// Tone emitter error types and constants

use crate::error::ErrorCode;
use std::fmt;

/// Tone emitter error code constants
///
/// Error code range: 1001-1003
pub struct EmitterErrorCodes {}

impl EmitterErrorCodes {
    /// Tone playback could not start or stopped abnormally
    pub const PLAYBACK_FAILED: i32 = 1001;

    /// No output device is available
    pub const DEVICE_UNAVAILABLE: i32 = 1002;

    /// Handle does not refer to a tone owned by this emitter
    pub const UNKNOWN_HANDLE: i32 = 1003;
}

/// Errors reported by a tone emitter collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum EmitterError {
    /// Tone playback could not start or stopped abnormally
    PlaybackFailed { reason: String },

    /// No output device is available
    DeviceUnavailable,

    /// Handle does not refer to a tone owned by this emitter
    UnknownHandle { handle: u64 },
}

impl ErrorCode for EmitterError {
    fn code(&self) -> i32 {
        match self {
            EmitterError::PlaybackFailed { .. } => EmitterErrorCodes::PLAYBACK_FAILED,
            EmitterError::DeviceUnavailable => EmitterErrorCodes::DEVICE_UNAVAILABLE,
            EmitterError::UnknownHandle { .. } => EmitterErrorCodes::UNKNOWN_HANDLE,
        }
    }

    fn message(&self) -> String {
        match self {
            EmitterError::PlaybackFailed { reason } => format!("Tone playback failed: {}", reason),
            EmitterError::DeviceUnavailable => "No audio output device available".to_string(),
            EmitterError::UnknownHandle { handle } => format!("Unknown tone handle {}", handle),
        }
    }
}

impl fmt::Display for EmitterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EmitterError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for EmitterError {}
