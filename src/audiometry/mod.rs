// Audiometry module - threshold search and session data
//
// This module provides the data model and algorithmic core:
// 1. scale: Ears, test frequencies, and the dB HL ladder
// 2. search: Threshold search state machine for one (ear, frequency) pair
// 3. session: Response log, audiogram, and completed session values
// 4. progress: Progress snapshots for a running test
//
// The test workflow:
// 1. Run a ThresholdSearch per (ear, frequency) pair
// 2. Record every response and each converged threshold in a SessionRecorder
// 3. Finalize to a CompletedSession once every pair has a threshold

pub mod progress;
pub mod scale;
pub mod search;
pub mod session;

pub use progress::{TestProgress, TestStatus};
pub use scale::{Ear, Frequency, HearingLevel, LevelStep};
pub use search::{
    transition, SearchPhase, SearchState, SearchStep, Threshold, ThresholdBasis,
    ThresholdSearch, Transition,
};
pub use session::{
    Audiogram, AudiogramEntry, CompletedSession, ResponseEvent, SessionRecorder, TOTAL_PAIRS,
};
