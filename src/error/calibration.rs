// Calibration error types and constants

use crate::audiometry::scale::Frequency;
use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Error code range: 2001-2005
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Calibration profile could not be read or written
    pub const IO: i32 = 2001;

    /// Stored calibration profile is malformed
    pub const PARSE: i32 = 2002;

    /// Adjustment value is negative or not finite
    pub const INVALID_ADJUSTMENT: i32 = 2003;

    /// Calibration store lock was poisoned
    pub const STATE_POISONED: i32 = 2004;

    /// No calibration profile is stored
    pub const NOT_FOUND: i32 = 2005;
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// Staleness is not an error; it is reported through `CalibrationStatus`.
///
/// Error code ranges: 2001-2005
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Calibration profile could not be read or written
    Io { reason: String },

    /// Stored calibration profile is malformed
    Parse { reason: String },

    /// Adjustment value is negative or not finite
    InvalidAdjustment { frequency: Frequency, value: f32 },

    /// Calibration store lock was poisoned
    StatePoisoned,

    /// No calibration profile is stored
    NotFound,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::Io { .. } => CalibrationErrorCodes::IO,
            CalibrationError::Parse { .. } => CalibrationErrorCodes::PARSE,
            CalibrationError::InvalidAdjustment { .. } => CalibrationErrorCodes::INVALID_ADJUSTMENT,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::NotFound => CalibrationErrorCodes::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::Io { reason } => format!("Calibration I/O failed: {}", reason),
            CalibrationError::Parse { reason } => {
                format!("Calibration profile malformed: {}", reason)
            }
            CalibrationError::InvalidAdjustment { frequency, value } => {
                format!("Invalid calibration adjustment {} at {}", value, frequency)
            }
            CalibrationError::StatePoisoned => "Calibration state lock poisoned".to_string(),
            CalibrationError::NotFound => "No calibration profile stored".to_string(),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

impl From<std::io::Error> for CalibrationError {
    fn from(err: std::io::Error) -> Self {
        CalibrationError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::Parse {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_codes() {
        assert_eq!(
            CalibrationError::Io {
                reason: "test".to_string()
            }
            .code(),
            CalibrationErrorCodes::IO
        );
        assert_eq!(
            CalibrationError::Parse {
                reason: "test".to_string()
            }
            .code(),
            CalibrationErrorCodes::PARSE
        );
        assert_eq!(
            CalibrationError::InvalidAdjustment {
                frequency: Frequency::Hz1000,
                value: -1.0
            }
            .code(),
            CalibrationErrorCodes::INVALID_ADJUSTMENT
        );
        assert_eq!(
            CalibrationError::StatePoisoned.code(),
            CalibrationErrorCodes::STATE_POISONED
        );
        assert_eq!(
            CalibrationError::NotFound.code(),
            CalibrationErrorCodes::NOT_FOUND
        );
    }

    #[test]
    fn test_calibration_error_messages() {
        let err = CalibrationError::InvalidAdjustment {
            frequency: Frequency::Hz2000,
            value: -0.5,
        };
        assert_eq!(
            err.message(),
            "Invalid calibration adjustment -0.5 at 2000 Hz"
        );

        let err = CalibrationError::NotFound;
        assert!(err.message().contains("No calibration"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CalibrationError::from(io);
        assert_eq!(err.code(), CalibrationErrorCodes::IO);
        assert!(format!("{}", err).contains("missing"));
    }
}
