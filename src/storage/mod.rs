// Result persistence - session reports and the stores that keep them
//
// A report pairs a completed session with its classification. Stores do not
// deduplicate; the manager's "already saved" flag keeps a session from being
// handed over twice.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::audiometry::session::CompletedSession;
use crate::classification::classifier::{ClassificationReport, HearingClassifier};
use crate::error::AudiometryError;

/// Completed session plus derived classification and recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session: CompletedSession,
    pub classification: ClassificationReport,
}

impl SessionReport {
    pub fn new(session: CompletedSession, classification: ClassificationReport) -> Self {
        Self {
            session,
            classification,
        }
    }

    /// Classify `session` and bundle the result
    pub fn classify(session: CompletedSession, classifier: &HearingClassifier) -> Self {
        let classification = classifier.classify(session.audiogram());
        Self::new(session, classification)
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn to_json(&self) -> Result<String, AudiometryError> {
        serde_json::to_string_pretty(self).map_err(storage_error)
    }
}

/// Persistence contract for session reports
pub trait ResultStore: Send + Sync {
    fn save(&self, report: &SessionReport) -> Result<(), AudiometryError>;

    /// Load a report by session id
    fn load(&self, session_id: &str) -> Result<Option<SessionReport>, AudiometryError>;
}

fn storage_error(err: impl std::fmt::Display) -> AudiometryError {
    AudiometryError::Storage {
        reason: err.to_string(),
    }
}

/// One `<session id>.json` file per report in a directory
pub struct JsonDirectoryResultStore {
    dir: PathBuf,
}

impl JsonDirectoryResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

impl ResultStore for JsonDirectoryResultStore {
    fn save(&self, report: &SessionReport) -> Result<(), AudiometryError> {
        fs::create_dir_all(&self.dir).map_err(storage_error)?;
        let path = self.path_for(report.session_id());
        fs::write(&path, report.to_json()?).map_err(storage_error)?;
        log::info!("[Storage] Saved session {} to {:?}", report.session_id(), path);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionReport>, AudiometryError> {
        let path = self.path_for(session_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error(err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(storage_error)
    }
}

/// Volatile store for tests and tooling
#[derive(Default)]
pub struct MemoryResultStore {
    reports: RwLock<Vec<SessionReport>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of save calls received
    pub fn save_count(&self) -> usize {
        self.reports.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn reports(&self) -> Vec<SessionReport> {
        self.reports
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ResultStore for MemoryResultStore {
    fn save(&self, report: &SessionReport) -> Result<(), AudiometryError> {
        self.reports
            .write()
            .map_err(|_| AudiometryError::StatePoisoned)?
            .push(report.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<SessionReport>, AudiometryError> {
        let reports = self
            .reports
            .read()
            .map_err(|_| AudiometryError::StatePoisoned)?;
        Ok(reports
            .iter()
            .rev()
            .find(|r| r.session_id() == session_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audiometry::scale::{Ear, Frequency, HearingLevel};
    use crate::audiometry::search::{Threshold, ThresholdBasis};
    use crate::audiometry::session::SessionRecorder;
    use crate::classification::banding::HearingClassification;

    fn report(id: &str) -> SessionReport {
        let mut recorder = SessionRecorder::new(id, Ear::Right, 1_000);
        for ear in [Ear::Right, Ear::Left] {
            for frequency in Frequency::ALL {
                let level = HearingLevel::from_db(30).unwrap();
                recorder.record_threshold(
                    ear,
                    frequency,
                    Threshold::new(level, ThresholdBasis::Converged),
                );
            }
        }
        let session = recorder.finalize(2_000).unwrap();
        SessionReport::classify(session, &HearingClassifier::new())
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "puretone_results_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_report_classifies_session() {
        let report = report("abc");
        assert_eq!(report.session_id(), "abc");
        assert_eq!(report.classification.right, HearingClassification::Mild);
        assert_eq!(report.classification.left, HearingClassification::Mild);
    }

    #[test]
    fn test_json_directory_roundtrip() {
        let dir = temp_dir("roundtrip");
        let store = JsonDirectoryResultStore::new(&dir);
        let saved = report("session-1");

        store.save(&saved).unwrap();
        assert!(store.path_for("session-1").exists());
        assert_eq!(store.load("session-1").unwrap(), Some(saved));
        assert_eq!(store.load("missing").unwrap(), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_json_directory_rejects_corrupt_file() {
        let dir = temp_dir("corrupt");
        let store = JsonDirectoryResultStore::new(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(store.path_for("bad"), "{ not json").unwrap();

        let err = store.load("bad").unwrap_err();
        assert!(matches!(err, AudiometryError::Storage { .. }));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_memory_store_does_not_deduplicate() {
        let store = MemoryResultStore::new();
        let saved = report("same");
        store.save(&saved).unwrap();
        store.save(&saved).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load("same").unwrap(), Some(saved));
        assert_eq!(store.load("other").unwrap(), None);
    }
}
