// Progress tracking for a running test
//
// Progress is the fraction of (ear, frequency) pairs with a threshold. It
// only grows during a session because thresholds are never removed.

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::{Ear, Frequency};
use crate::audiometry::search::SearchPhase;

/// Lifecycle of the test orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// No test started
    Idle,
    /// A tone is out and a response is awaited
    AwaitingResponse,
    /// Emitter failed; waiting for the caller to retry or stop
    EmitterFault,
    /// Every pair has a threshold
    Completed,
    /// Stopped before completion; recorded events are kept as they were
    Stopped,
}

/// Snapshot of test progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestProgress {
    pub status: TestStatus,
    /// Pairs with a threshold
    pub completed_pairs: usize,
    /// Pairs in a full test
    pub total_pairs: usize,
    /// Pair under test, if any
    pub current_ear: Option<Ear>,
    pub current_frequency: Option<Frequency>,
    /// Search phase of the pair under test
    pub phase: Option<SearchPhase>,
}

impl TestProgress {
    /// Progress before any test has started
    pub fn idle(total_pairs: usize) -> Self {
        Self {
            status: TestStatus::Idle,
            completed_pairs: 0,
            total_pairs,
            current_ear: None,
            current_frequency: None,
            phase: None,
        }
    }

    /// Completed fraction in [0, 1]
    pub fn fraction(&self) -> f32 {
        if self.total_pairs == 0 {
            return 0.0;
        }
        (self.completed_pairs as f32 / self.total_pairs as f32).clamp(0.0, 1.0)
    }

    /// Get progress percentage (0-100)
    pub fn percentage(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.status == TestStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_progress() {
        let progress = TestProgress::idle(10);
        assert_eq!(progress.fraction(), 0.0);
        assert_eq!(progress.percentage(), 0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_fraction_and_percentage() {
        let progress = TestProgress {
            status: TestStatus::AwaitingResponse,
            completed_pairs: 3,
            total_pairs: 10,
            current_ear: Some(Ear::Right),
            current_frequency: Some(Frequency::Hz4000),
            phase: Some(SearchPhase::Descending),
        };
        assert!((progress.fraction() - 0.3).abs() < f32::EPSILON);
        assert_eq!(progress.percentage(), 30);
    }

    #[test]
    fn test_zero_total_pairs() {
        let progress = TestProgress::idle(0);
        assert_eq!(progress.fraction(), 0.0);
    }
}
