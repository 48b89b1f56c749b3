// Pure-Tone Audiometry Core
// Hughson-Westlake threshold search, test orchestration, hearing
// classification, and calibration mapping

// Module declarations
pub mod audiometry;
pub mod calibration;
pub mod classification;
pub mod config;
pub mod engine;
pub mod error;
pub mod storage;

// Re-exports for convenience
pub use audiometry::{Ear, Frequency, HearingLevel, Threshold, ThresholdBasis};
pub use calibration::{CalibrationMapping, CalibrationProfile, CalibrationStatus};
pub use classification::{ClassificationReport, HearingClassification, HearingClassifier};
pub use config::AppConfig;
pub use engine::{AudiometryManager, TestEvent, TestOrchestrator};
pub use error::{AudiometryError, ErrorCode};
pub use storage::{ResultStore, SessionReport};

use tracing_subscriber::EnvFilter;

/// Install a stderr log subscriber for binaries
///
/// `log` records from the library are bridged into `tracing`. The filter is
/// read from `RUST_LOG` and defaults to `info`. Calling this more than once is
/// harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
