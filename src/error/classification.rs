// Classification error types and constants
//
// These errors never leave the classifier: each one selects a documented
// fallback and is only logged.

use crate::audiometry::scale::Ear;
use crate::error::ErrorCode;
use std::fmt;

/// Classification error code constants
///
/// Error code range: 4001-4003
pub struct ClassificationErrorCodes {}

impl ClassificationErrorCodes {
    /// No usable thresholds for an ear, or too few for the model
    pub const INSUFFICIENT_DATA: i32 = 4001;

    /// No model classifier is configured
    pub const MODEL_UNAVAILABLE: i32 = 4002;

    /// Model classifier returned an error
    pub const MODEL_FAILED: i32 = 4003;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationError {
    /// No usable thresholds for an ear, or too few for the model
    InsufficientData { ear: Ear },

    /// No model classifier is configured
    ModelUnavailable,

    /// Model classifier returned an error
    ModelFailed { reason: String },
}

impl ErrorCode for ClassificationError {
    fn code(&self) -> i32 {
        match self {
            ClassificationError::InsufficientData { .. } => {
                ClassificationErrorCodes::INSUFFICIENT_DATA
            }
            ClassificationError::ModelUnavailable => ClassificationErrorCodes::MODEL_UNAVAILABLE,
            ClassificationError::ModelFailed { .. } => ClassificationErrorCodes::MODEL_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            ClassificationError::InsufficientData { ear } => {
                format!("Insufficient threshold data for {} ear", ear)
            }
            ClassificationError::ModelUnavailable => "No model classifier configured".to_string(),
            ClassificationError::ModelFailed { reason } => {
                format!("Model classifier failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClassificationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ClassificationError {}
