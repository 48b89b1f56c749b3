// Error types for the audiometry engine
//
// This module defines custom error types for tone playback, test sequencing,
// calibration, and classification, providing structured error handling with
// numeric codes the surrounding application can map to user-facing prompts.

mod audiometry;
mod calibration;
mod classification;
mod emitter;

pub use audiometry::{log_audiometry_error, AudiometryError, AudiometryErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use classification::{ClassificationError, ClassificationErrorCodes};
pub use emitter::{EmitterError, EmitterErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the engine boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
