// AudiometryManager: async shell around the test orchestrator
//
// Single Responsibility: tone timers, event broadcast, and result saving
//
// The orchestrator lives behind one mutex. Every event that can resolve a
// presentation (real response, timer expiry, emitter failure, stop) is applied
// while holding that mutex, and timers re-check their presentation id under
// it, so a response and a timeout for the same tone can never both apply.
// Each presentation gets one timer task: it opens the tone for responses when
// the start delay has passed, then records "not heard" when the window closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use crate::audiometry::progress::TestProgress;
use crate::audiometry::scale::Ear;
use crate::audiometry::session::{CompletedSession, TOTAL_PAIRS};
use crate::calibration::mapping::CalibrationMapping;
use crate::classification::classifier::HearingClassifier;
use crate::engine::events::TestEvent;
use crate::engine::orchestrator::{NextStep, Presentation, ResponseOutcome, TestOrchestrator};
use crate::error::{log_audiometry_error, AudiometryError, EmitterError, ErrorCode};
use crate::storage::{ResultStore, SessionReport};

/// Buffer size of the event channel; a full session emits a few hundred events
const EVENT_BUFFER: usize = 256;

struct PendingTimer {
    presentation_id: u64,
    task: JoinHandle<()>,
}

struct ManagerInner {
    orchestrator: Mutex<TestOrchestrator>,
    timer: Mutex<Option<PendingTimer>>,
    events: broadcast::Sender<TestEvent>,
    classifier: HearingClassifier,
    result_store: Option<Arc<dyn ResultStore>>,
    saved: AtomicBool,
}

/// Runs tests with real response timeouts and publishes their progress
///
/// Cloning is cheap; clones share the same test. Methods that present tones
/// spawn the response timer with `tokio::spawn` and must be called from
/// within a Tokio runtime.
///
/// # Example
/// ```ignore
/// let store: Arc<dyn ResultStore> = Arc::new(JsonDirectoryResultStore::new("results"));
/// let manager =
///     AudiometryManager::with_services(orchestrator, HearingClassifier::new(), Some(store));
/// let mut events = manager.subscribe();
/// manager.start_test(Ear::Right)?;
/// // ... on TestEvent::ToneStarted, forward listener input:
/// manager.respond(true)?;
/// // ... once TestEvent::SessionCompleted arrives:
/// let report = manager.save_results()?;
/// ```
#[derive(Clone)]
pub struct AudiometryManager {
    inner: Arc<ManagerInner>,
}

impl AudiometryManager {
    /// Create a manager with banding-only classification and no result store
    pub fn new(orchestrator: TestOrchestrator) -> Self {
        Self::with_services(orchestrator, HearingClassifier::new(), None)
    }

    pub fn with_services(
        orchestrator: TestOrchestrator,
        classifier: HearingClassifier,
        result_store: Option<Arc<dyn ResultStore>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(ManagerInner {
                orchestrator: Mutex::new(orchestrator),
                timer: Mutex::new(None),
                events,
                classifier,
                result_store,
                saved: AtomicBool::new(false),
            }),
        }
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Subscribe to test events
    ///
    /// Each subscriber receives every event sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.inner.events.subscribe()
    }

    /// Test events as a stream; lagged gaps are logged and skipped
    pub fn event_stream(&self) -> impl Stream<Item = TestEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(err) => {
                    log::warn!("[Manager] Event subscriber lagging: {}", err);
                    None
                }
            }
        })
    }

    // ========================================================================
    // TEST CONTROL
    // ========================================================================

    /// Start a test and arm the timer for the first tone
    ///
    /// # Errors
    /// - `AudiometryError::AlreadyRunning` if a test is in progress
    /// - `AudiometryError::EmitterFailure` if the first tone failed; the test
    ///   waits for [`retry`](Self::retry) or [`stop_test`](Self::stop_test)
    pub fn start_test(&self, starting_ear: Ear) -> Result<Presentation, AudiometryError> {
        let mut orchestrator = self.lock_orchestrator()?;
        let result = orchestrator.start_test(starting_ear);
        if matches!(result, Err(AudiometryError::AlreadyRunning)) {
            return result;
        }

        self.inner.saved.store(false, Ordering::SeqCst);
        self.cancel_timer();
        if let Some(recorder) = orchestrator.recorder() {
            self.publish(TestEvent::TestStarted {
                session_id: recorder.id().to_string(),
                starting_ear,
            });
        }
        self.after_presentation(&result);
        self.publish(TestEvent::Progress(orchestrator.progress()));
        result
    }

    /// Use the `starting_ear` from the configuration
    pub fn start_default_test(&self) -> Result<Presentation, AudiometryError> {
        let ear = self.lock_orchestrator()?.config().session.starting_ear;
        self.start_test(ear)
    }

    /// Deliver the listener's answer for the sounding tone
    ///
    /// The tone timer is cancelled before the answer is applied. Returns
    /// `ResponseOutcome::Ignored` when no tone is pending or the pending tone
    /// has not started yet; its timer keeps running in that case.
    pub fn respond(&self, heard: bool) -> Result<ResponseOutcome, AudiometryError> {
        let mut orchestrator = self.lock_orchestrator()?;
        if orchestrator.accepts_response() {
            self.cancel_timer();
        }
        let outcome = orchestrator.respond_to_tone(heard)?;
        self.publish_outcome(&orchestrator, &outcome);
        Ok(outcome)
    }

    /// Report a playback failure detected after `play` returned
    ///
    /// # Returns
    /// `true` if the failure belonged to the pending presentation
    pub fn report_tone_failure(
        &self,
        presentation_id: u64,
        error: EmitterError,
    ) -> Result<bool, AudiometryError> {
        let mut orchestrator = self.lock_orchestrator()?;
        let (code, message) = (error.code(), error.message());
        if !orchestrator.on_tone_failed(presentation_id, error) {
            return Ok(false);
        }

        self.cancel_timer();
        self.publish(TestEvent::EmitterFault {
            presentation_id: Some(presentation_id),
            code,
            message,
        });
        self.publish(TestEvent::Progress(orchestrator.progress()));
        Ok(true)
    }

    /// Present the current level again after an emitter fault
    ///
    /// # Errors
    /// - `AudiometryError::NotAwaitingRetry` if no fault is pending
    /// - `AudiometryError::EmitterFailure` if the emitter failed again
    pub fn retry(&self) -> Result<Presentation, AudiometryError> {
        let mut orchestrator = self.lock_orchestrator()?;
        let result = orchestrator.retry_presentation();
        if matches!(result, Err(AudiometryError::NotAwaitingRetry)) {
            return result;
        }
        self.after_presentation(&result);
        result
    }

    /// Stop the running test and discard its timer
    ///
    /// Recorded events stay as they are; the session is not finalized.
    ///
    /// # Errors
    /// `AudiometryError::NoActiveTest` if no test is running
    pub fn stop_test(&self) -> Result<(), AudiometryError> {
        let mut orchestrator = self.lock_orchestrator()?;
        orchestrator.stop_test()?;
        self.cancel_timer();

        let progress = orchestrator.progress();
        self.publish(TestEvent::TestStopped {
            completed_pairs: progress.completed_pairs,
        });
        self.publish(TestEvent::Progress(progress));
        Ok(())
    }

    /// Swap the calibration used by the next test
    pub fn set_calibration(&self, mapping: CalibrationMapping) -> Result<(), AudiometryError> {
        self.lock_orchestrator()?.set_mapping(mapping)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn progress(&self) -> Result<TestProgress, AudiometryError> {
        Ok(self.lock_orchestrator()?.progress())
    }

    /// Id of the presentation awaiting a response, if any
    pub fn pending_presentation(&self) -> Result<Option<u64>, AudiometryError> {
        Ok(self.lock_orchestrator()?.pending_presentation())
    }

    pub fn completed_session(&self) -> Result<Option<CompletedSession>, AudiometryError> {
        Ok(self.lock_orchestrator()?.completed_session().cloned())
    }

    /// Classified report for the completed session
    ///
    /// # Errors
    /// `AudiometryError::SessionIncomplete` if the last test did not complete
    pub fn report(&self) -> Result<SessionReport, AudiometryError> {
        let session = {
            let orchestrator = self.lock_orchestrator()?;
            match orchestrator.completed_session() {
                Some(session) => session.clone(),
                None => {
                    return Err(AudiometryError::SessionIncomplete {
                        completed: orchestrator.progress().completed_pairs,
                        total: TOTAL_PAIRS,
                    })
                }
            }
        };
        Ok(SessionReport::classify(session, &self.inner.classifier))
    }

    pub fn is_saved(&self) -> bool {
        self.inner.saved.load(Ordering::SeqCst)
    }

    /// Classify the completed session and hand it to the result store once
    ///
    /// # Errors
    /// - `AudiometryError::AlreadySaved` if this session was already stored
    /// - `AudiometryError::SessionIncomplete` if the last test did not complete
    /// - `AudiometryError::Storage` if no store is configured or it failed
    pub fn save_results(&self) -> Result<SessionReport, AudiometryError> {
        if self
            .inner
            .saved
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AudiometryError::AlreadySaved);
        }

        let result = self.report().and_then(|report| {
            let store = self
                .inner
                .result_store
                .as_ref()
                .ok_or_else(|| AudiometryError::Storage {
                    reason: "no result store configured".to_string(),
                })?;
            store.save(&report)?;
            Ok(report)
        });

        match &result {
            Ok(report) => log::info!("[Manager] Session {} saved", report.session_id()),
            Err(err) => {
                self.inner.saved.store(false, Ordering::SeqCst);
                log_audiometry_error(err, "save_results");
            }
        }
        result
    }

    // ========================================================================
    // HELPER METHODS - Timers, events, and lock management
    // ========================================================================

    /// Safely acquire lock on the orchestrator
    fn lock_orchestrator(&self) -> Result<MutexGuard<'_, TestOrchestrator>, AudiometryError> {
        self.inner
            .orchestrator
            .lock()
            .map_err(|_| AudiometryError::StatePoisoned)
    }

    fn publish(&self, event: TestEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Publish events for a presentation attempt and arm its timer
    fn after_presentation(&self, result: &Result<Presentation, AudiometryError>) {
        match result {
            Ok(presentation) => self.arm_presentation(presentation),
            Err(err) => {
                self.publish(TestEvent::EmitterFault {
                    presentation_id: None,
                    code: err.code(),
                    message: err.message(),
                });
            }
        }
    }

    fn publish_outcome(&self, orchestrator: &TestOrchestrator, outcome: &ResponseOutcome) {
        let ResponseOutcome::Applied(applied) = outcome else {
            return;
        };

        self.publish(TestEvent::ResponseRecorded(applied.event));
        if let Some(result) = applied.threshold {
            self.publish(TestEvent::ThresholdFound {
                ear: result.ear,
                frequency: result.frequency,
                threshold: result.threshold,
            });
        }

        match &applied.next {
            NextStep::Tone(presentation) => self.arm_presentation(presentation),
            NextStep::Fault(err) => {
                self.publish(TestEvent::EmitterFault {
                    presentation_id: None,
                    code: err.code(),
                    message: err.message(),
                });
            }
            NextStep::Completed => {
                if let Some(session) = orchestrator.completed_session() {
                    self.publish(TestEvent::SessionCompleted {
                        session_id: session.id().to_string(),
                    });
                }
            }
        }
        self.publish(TestEvent::Progress(orchestrator.progress()));
    }

    fn arm_presentation(&self, presentation: &Presentation) {
        self.publish(TestEvent::tone_presented(presentation));
        if presentation.request.start_delay_ms == 0 {
            self.publish(TestEvent::tone_started(presentation));
        }
        self.schedule_timers(presentation);
    }

    /// Arm the tone timer for `presentation`, replacing any previous one
    fn schedule_timers(&self, presentation: &Presentation) {
        let manager = self.clone();
        let presentation = *presentation;
        let presentation_id = presentation.id;
        let start_delay = Duration::from_millis(presentation.request.start_delay_ms);
        let remaining = presentation.response_window().saturating_sub(start_delay);

        let task = tokio::spawn(async move {
            if !start_delay.is_zero() {
                tokio::time::sleep(start_delay).await;
                manager.on_tone_started(&presentation);
            }
            tokio::time::sleep(remaining).await;
            manager.on_timer_elapsed(presentation_id);
        });

        match self.inner.timer.lock() {
            Ok(mut slot) => {
                if let Some(previous) = slot.replace(PendingTimer {
                    presentation_id,
                    task,
                }) {
                    previous.task.abort();
                }
            }
            Err(_) => {
                task.abort();
                log_audiometry_error(&AudiometryError::StatePoisoned, "schedule_timers");
            }
        }
    }

    fn cancel_timer(&self) {
        if let Ok(mut slot) = self.inner.timer.lock() {
            if let Some(timer) = slot.take() {
                timer.task.abort();
            }
        }
    }

    fn on_tone_started(&self, presentation: &Presentation) {
        let mut orchestrator = match self.lock_orchestrator() {
            Ok(orchestrator) => orchestrator,
            Err(err) => {
                log_audiometry_error(&err, "tone_started");
                return;
            }
        };
        if orchestrator.open_for_response(presentation.id) {
            self.publish(TestEvent::tone_started(presentation));
        }
    }

    fn on_timer_elapsed(&self, presentation_id: u64) {
        tracing::debug!(
            "[Manager] Response window for presentation {} closed",
            presentation_id
        );
        let mut orchestrator = match self.lock_orchestrator() {
            Ok(orchestrator) => orchestrator,
            Err(err) => {
                log_audiometry_error(&err, "response_timeout");
                return;
            }
        };

        // Release our own slot without aborting the running task
        if let Ok(mut slot) = self.inner.timer.lock() {
            if slot
                .as_ref()
                .is_some_and(|timer| timer.presentation_id == presentation_id)
            {
                slot.take();
            }
        }

        match orchestrator.on_response_timeout(presentation_id) {
            Ok(outcome) => self.publish_outcome(&orchestrator, &outcome),
            Err(err) => log_audiometry_error(&err, "response_timeout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audiometry::progress::TestStatus;
    use crate::audiometry::search::SearchPhase;
    use crate::config::AppConfig;
    use crate::engine::clock::StubClock;
    use crate::engine::emitter::StubEmitter;
    use crate::storage::MemoryResultStore;
    use std::time::Duration;

    fn setup() -> (AudiometryManager, Arc<StubEmitter>) {
        let emitter = Arc::new(StubEmitter::new());
        let orchestrator = TestOrchestrator::new(
            emitter.clone(),
            CalibrationMapping::uncalibrated(),
            AppConfig::default(),
            Arc::new(StubClock::default()),
        );
        (AudiometryManager::new(orchestrator), emitter)
    }

    fn drain(rx: &mut broadcast::Receiver<TestEvent>) -> Vec<TestEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_not_heard() {
        let (manager, _emitter) = setup();
        let mut rx = manager.subscribe();
        let first = manager.start_test(Ear::Right).unwrap();

        tokio::time::sleep(first.response_window() + Duration::from_millis(1)).await;

        let events = drain(&mut rx);
        let recorded: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TestEvent::ResponseRecorded(event) => Some(*event),
                _ => None,
            })
            .collect();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].timed_out);
        assert!(!recorded[0].heard);
        assert_eq!(manager.pending_presentation().unwrap(), Some(first.id + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_cancels_timer() {
        let (manager, _emitter) = setup();
        let first = manager.start_test(Ear::Right).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.respond(true).unwrap().is_ignored());
        let second = manager.pending_presentation().unwrap();

        // Past the first window but inside the second one
        tokio::time::sleep(first.response_window()).await;
        assert_eq!(manager.pending_presentation().unwrap(), second);

        let progress = manager.progress().unwrap();
        assert_eq!(progress.status, TestStatus::AwaitingResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_timeout_is_ignored() {
        let (manager, _emitter) = setup();
        let mut rx = manager.subscribe();
        let first = manager.start_test(Ear::Right).unwrap();
        tokio::time::sleep(first.response_window() + Duration::from_millis(1)).await;

        // The next tone is out but still inside its start delay
        let second = first.id + 1;
        assert_eq!(manager.pending_presentation().unwrap(), Some(second));
        assert!(manager.respond(true).unwrap().is_ignored());
        let recorded: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                TestEvent::ResponseRecorded(event) => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].presentation_id, first.id);
        assert!(recorded[0].timed_out);

        // Once it sounds, answers apply to it
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            TestEvent::ToneStarted { presentation_id, .. } if *presentation_id == second
        )));
        match manager.respond(true).unwrap() {
            ResponseOutcome::Applied(applied) => {
                assert_eq!(applied.event.presentation_id, second);
                assert!(applied.event.heard);
                assert!(!applied.event.timed_out);
            }
            ResponseOutcome::Ignored => panic!("response to the sounding tone was ignored"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_press_advances_once() {
        let (manager, _emitter) = setup();
        let first = manager.start_test(Ear::Right).unwrap();

        assert!(!manager.respond(true).unwrap().is_ignored());
        assert!(manager.respond(true).unwrap().is_ignored());

        let progress = manager.progress().unwrap();
        assert_eq!(progress.phase, Some(SearchPhase::Descending));
        assert_eq!(manager.pending_presentation().unwrap(), Some(first.id + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_press_keeps_timer_running() {
        let (manager, _emitter) = setup();
        manager.start_test(Ear::Right).unwrap();
        manager.respond(true).unwrap();
        let second = manager.pending_presentation().unwrap().unwrap();

        assert!(manager.respond(false).unwrap().is_ignored());
        // 500 ms start delay plus the 5000 ms response window
        tokio::time::sleep(Duration::from_millis(5501)).await;

        // The timer resolved the second tone and presented the third
        assert_eq!(manager.pending_presentation().unwrap(), Some(second + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_result_store() {
        let store = Arc::new(MemoryResultStore::new());
        let orchestrator = TestOrchestrator::new(
            Arc::new(StubEmitter::new()),
            CalibrationMapping::uncalibrated(),
            AppConfig::default(),
            Arc::new(StubClock::default()),
        );
        let manager = AudiometryManager::with_services(
            orchestrator,
            HearingClassifier::new(),
            Some(store.clone()),
        );
        let listener = manager.clone();
        let mut rx = manager.subscribe();

        manager.start_test(Ear::Right).unwrap();
        loop {
            match rx.recv().await.unwrap() {
                TestEvent::ToneStarted { level, .. } => {
                    listener.respond(level.db() >= 10).unwrap();
                }
                TestEvent::SessionCompleted { .. } => break,
                _ => {}
            }
        }

        listener.save_results().unwrap();
        assert!(manager.is_saved());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let (manager, emitter) = setup();
        let mut rx = manager.subscribe();
        let first = manager.start_test(Ear::Right).unwrap();
        manager.stop_test().unwrap();

        tokio::time::sleep(first.response_window() * 2).await;
        let events = drain(&mut rx);
        assert!(events.iter().all(|e| !matches!(e, TestEvent::ResponseRecorded(_))));
        assert!(events.iter().any(|e| e.is_terminal()));
        assert_eq!(emitter.play_count(), 1);
        assert_eq!(manager.progress().unwrap().status, TestStatus::Stopped);
        assert!(matches!(
            manager.stop_test(),
            Err(AudiometryError::NoActiveTest)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_failure_pauses_without_synthetic_response() {
        let (manager, _emitter) = setup();
        let mut rx = manager.subscribe();
        let first = manager.start_test(Ear::Right).unwrap();

        assert!(manager
            .report_tone_failure(first.id, EmitterError::DeviceUnavailable)
            .unwrap());
        tokio::time::sleep(first.response_window() * 2).await;

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            TestEvent::EmitterFault { presentation_id: Some(id), .. } if *id == first.id
        )));
        assert!(events.iter().all(|e| !matches!(e, TestEvent::ResponseRecorded(_))));
        assert_eq!(manager.progress().unwrap().status, TestStatus::EmitterFault);

        let retried = manager.retry().unwrap();
        assert_eq!(retried.level, first.level);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emitter_failure_on_start_publishes_fault() {
        let (manager, emitter) = setup();
        let mut rx = manager.subscribe();
        emitter.fail_next(1);

        assert!(matches!(
            manager.start_test(Ear::Left),
            Err(AudiometryError::EmitterFailure { .. })
        ));
        let events = drain(&mut rx);
        assert!(matches!(events[0], TestEvent::TestStarted { starting_ear: Ear::Left, .. }));
        assert!(matches!(events[1], TestEvent::EmitterFault { presentation_id: None, .. }));
        assert!(matches!(manager.retry(), Ok(_)));
        assert!(matches!(manager.retry(), Err(AudiometryError::NotAwaitingRetry)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_requires_completed_session() {
        let store = Arc::new(MemoryResultStore::new());
        let emitter = Arc::new(StubEmitter::new());
        let orchestrator = TestOrchestrator::new(
            emitter,
            CalibrationMapping::uncalibrated(),
            AppConfig::default(),
            Arc::new(StubClock::default()),
        );
        let manager = AudiometryManager::with_services(
            orchestrator,
            HearingClassifier::new(),
            Some(store.clone()),
        );

        manager.start_test(Ear::Right).unwrap();
        assert!(matches!(
            manager.save_results(),
            Err(AudiometryError::SessionIncomplete { completed: 0, total: 10 })
        ));
        assert!(!manager.is_saved());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_save_before_any_test_fails() {
        let (manager, _emitter) = setup();
        assert!(matches!(
            manager.save_results(),
            Err(AudiometryError::SessionIncomplete { .. })
        ));
        assert!(!manager.is_saved());
    }
}
