// Test session records - response log, audiogram, and completed sessions
//
// A running test appends to a `SessionRecorder`. Finalizing consumes the
// recorder and yields a `CompletedSession`, a value with no mutators that can
// be handed to the classifier and persistence collaborators.

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::{Ear, Frequency, HearingLevel};
use crate::audiometry::search::Threshold;
use crate::error::AudiometryError;

/// Number of (ear, frequency) pairs in a full test
pub const TOTAL_PAIRS: usize = 2 * Frequency::ALL.len();

/// One answered (or timed-out) presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    /// Presentation this response belongs to
    pub presentation_id: u64,
    pub ear: Ear,
    pub frequency: Frequency,
    /// Level the tone was played at
    pub level: HearingLevel,
    pub heard: bool,
    /// True when the response was synthesized after the response window closed
    pub timed_out: bool,
    /// Wall-clock time of the response (ms since Unix epoch)
    pub timestamp_ms: u64,
}

/// Threshold for one (ear, frequency) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudiogramEntry {
    pub ear: Ear,
    pub frequency: Frequency,
    pub threshold: Threshold,
}

/// Thresholds across ears and frequencies, ordered by ear then frequency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audiogram {
    entries: Vec<AudiogramEntry>,
}

impl Audiogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a threshold, replacing any earlier value for the same pair
    pub fn insert(&mut self, ear: Ear, frequency: Frequency, threshold: Threshold) {
        let entry = AudiogramEntry {
            ear,
            frequency,
            threshold,
        };
        match self
            .entries
            .binary_search_by_key(&(ear, frequency), |e| (e.ear, e.frequency))
        {
            Ok(index) => self.entries[index] = entry,
            Err(index) => self.entries.insert(index, entry),
        }
    }

    pub fn get(&self, ear: Ear, frequency: Frequency) -> Option<Threshold> {
        self.entries
            .iter()
            .find(|e| e.ear == ear && e.frequency == frequency)
            .map(|e| e.threshold)
    }

    /// Thresholds for one ear in frequency order
    pub fn for_ear(&self, ear: Ear) -> Vec<(Frequency, Threshold)> {
        self.entries
            .iter()
            .filter(|e| e.ear == ear)
            .map(|e| (e.frequency, e.threshold))
            .collect()
    }

    /// Threshold values (dB HL) for one ear in frequency order
    pub fn levels_db(&self, ear: Ear) -> Vec<f32> {
        self.for_ear(ear)
            .into_iter()
            .map(|(_, threshold)| threshold.db() as f32)
            .collect()
    }

    pub fn entries(&self) -> &[AudiogramEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every (ear, frequency) pair has a threshold
    pub fn is_complete(&self) -> bool {
        self.entries.len() == TOTAL_PAIRS
    }
}

/// Append-only record of a test in progress
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    id: String,
    starting_ear: Ear,
    started_at_ms: u64,
    events: Vec<ResponseEvent>,
    audiogram: Audiogram,
}

impl SessionRecorder {
    pub fn new(id: impl Into<String>, starting_ear: Ear, started_at_ms: u64) -> Self {
        Self {
            id: id.into(),
            starting_ear,
            started_at_ms,
            events: Vec::new(),
            audiogram: Audiogram::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn starting_ear(&self) -> Ear {
        self.starting_ear
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn events(&self) -> &[ResponseEvent] {
        &self.events
    }

    pub fn audiogram(&self) -> &Audiogram {
        &self.audiogram
    }

    pub fn record_response(&mut self, event: ResponseEvent) {
        self.events.push(event);
    }

    pub fn record_threshold(&mut self, ear: Ear, frequency: Frequency, threshold: Threshold) {
        self.audiogram.insert(ear, frequency, threshold);
    }

    /// Freeze the recorder into a completed session
    ///
    /// # Errors
    /// `AudiometryError::SessionIncomplete` if any pair lacks a threshold
    pub fn finalize(self, completed_at_ms: u64) -> Result<CompletedSession, AudiometryError> {
        if !self.audiogram.is_complete() {
            return Err(AudiometryError::SessionIncomplete {
                completed: self.audiogram.len(),
                total: TOTAL_PAIRS,
            });
        }

        Ok(CompletedSession {
            id: self.id,
            starting_ear: self.starting_ear,
            started_at_ms: self.started_at_ms,
            completed_at_ms,
            events: self.events,
            audiogram: self.audiogram,
        })
    }
}

/// Finished test: full response log plus one threshold per pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    id: String,
    starting_ear: Ear,
    started_at_ms: u64,
    completed_at_ms: u64,
    events: Vec<ResponseEvent>,
    audiogram: Audiogram,
}

impl CompletedSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn starting_ear(&self) -> Ear {
        self.starting_ear
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn completed_at_ms(&self) -> u64 {
        self.completed_at_ms
    }

    pub fn events(&self) -> &[ResponseEvent] {
        &self.events
    }

    pub fn audiogram(&self) -> &Audiogram {
        &self.audiogram
    }

    pub fn threshold(&self, ear: Ear, frequency: Frequency) -> Option<Threshold> {
        self.audiogram.get(ear, frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audiometry::search::ThresholdBasis;

    fn threshold(db: i32) -> Threshold {
        Threshold::new(HearingLevel::from_db(db).unwrap(), ThresholdBasis::Converged)
    }

    fn full_recorder() -> SessionRecorder {
        let mut recorder = SessionRecorder::new("session-1", Ear::Right, 1_000);
        for ear in [Ear::Right, Ear::Left] {
            for frequency in Frequency::ALL {
                recorder.record_threshold(ear, frequency, threshold(20));
            }
        }
        recorder
    }

    #[test]
    fn test_audiogram_orders_by_ear_then_frequency() {
        let mut audiogram = Audiogram::new();
        audiogram.insert(Ear::Right, Frequency::Hz4000, threshold(30));
        audiogram.insert(Ear::Left, Frequency::Hz1000, threshold(10));
        audiogram.insert(Ear::Right, Frequency::Hz500, threshold(20));

        let order: Vec<_> = audiogram
            .entries()
            .iter()
            .map(|e| (e.ear, e.frequency))
            .collect();
        assert_eq!(
            order,
            vec![
                (Ear::Left, Frequency::Hz1000),
                (Ear::Right, Frequency::Hz500),
                (Ear::Right, Frequency::Hz4000),
            ]
        );
        assert_eq!(audiogram.levels_db(Ear::Right), vec![20.0, 30.0]);
    }

    #[test]
    fn test_audiogram_insert_replaces_existing_pair() {
        let mut audiogram = Audiogram::new();
        audiogram.insert(Ear::Left, Frequency::Hz500, threshold(10));
        audiogram.insert(Ear::Left, Frequency::Hz500, threshold(35));
        assert_eq!(audiogram.len(), 1);
        assert_eq!(audiogram.get(Ear::Left, Frequency::Hz500), Some(threshold(35)));
    }

    #[test]
    fn test_finalize_requires_every_pair() {
        let mut recorder = SessionRecorder::new("partial", Ear::Left, 0);
        recorder.record_threshold(Ear::Left, Frequency::Hz500, threshold(20));
        let err = recorder.finalize(10).unwrap_err();
        assert_eq!(
            err,
            AudiometryError::SessionIncomplete {
                completed: 1,
                total: TOTAL_PAIRS
            }
        );
    }

    #[test]
    fn test_finalize_keeps_events_and_thresholds() {
        let mut recorder = full_recorder();
        recorder.record_response(ResponseEvent {
            presentation_id: 1,
            ear: Ear::Right,
            frequency: Frequency::Hz500,
            level: HearingLevel::from_db(40).unwrap(),
            heard: true,
            timed_out: false,
            timestamp_ms: 1_500,
        });

        let session = recorder.finalize(9_000).unwrap();
        assert_eq!(session.id(), "session-1");
        assert_eq!(session.events().len(), 1);
        assert_eq!(session.completed_at_ms(), 9_000);
        assert!(session.audiogram().is_complete());
        assert_eq!(
            session.threshold(Ear::Left, Frequency::Hz8000),
            Some(threshold(20))
        );
    }

    #[test]
    fn test_completed_session_json_roundtrip() {
        let session = full_recorder().finalize(2_000).unwrap();
        let json = serde_json::to_string(&session).unwrap();
        let parsed: CompletedSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }
}
