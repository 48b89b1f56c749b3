// TestOrchestrator: sequences threshold searches across ears and frequencies
//
// Single Responsibility: turn external events (start, response, timeout,
// emitter failure, stop) into search transitions for the pair under test
//
// The orchestrator is synchronous and owns no timers. Every presentation gets
// a unique id; exactly one presentation is pending at a time and the first
// event that resolves it wins. A tone with a start delay accepts no response
// until the caller opens it with `open_for_response`, so late or repeated
// presses never land on a tone that has not sounded yet. Stale timeouts are
// ignored.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::audiometry::progress::{TestProgress, TestStatus};
use crate::audiometry::scale::{Ear, Frequency, HearingLevel};
use crate::audiometry::search::{SearchStep, Threshold, ThresholdSearch};
use crate::audiometry::session::{CompletedSession, ResponseEvent, SessionRecorder, TOTAL_PAIRS};
use crate::calibration::mapping::CalibrationMapping;
use crate::config::AppConfig;
use crate::engine::clock::Clock;
use crate::engine::emitter::{ToneEmitter, ToneHandle, ToneRequest};
use crate::error::{log_audiometry_error, AudiometryError, EmitterError};

/// A tone handed to the emitter and awaiting a response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presentation {
    pub id: u64,
    pub ear: Ear,
    pub frequency: Frequency,
    pub level: HearingLevel,
    pub handle: ToneHandle,
    pub request: ToneRequest,
    /// Time after which "not heard" is recorded, measured from `play`
    pub response_window_ms: u64,
}

impl Presentation {
    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.response_window_ms)
    }
}

/// Threshold recorded for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairResult {
    pub ear: Ear,
    pub frequency: Frequency,
    pub threshold: Threshold,
}

/// What the engine does after a response was applied
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// Another tone is out
    Tone(Presentation),
    /// The next tone could not be played; waiting for retry or stop
    Fault(EmitterError),
    /// Every pair has a threshold
    Completed,
}

/// A response that advanced the search
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedResponse {
    pub event: ResponseEvent,
    /// Set when this response finished the pair
    pub threshold: Option<PairResult>,
    pub next: NextStep,
}

/// Result of delivering a response or timeout
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Nothing was pending, or the event belonged to an older presentation
    Ignored,
    Applied(AppliedResponse),
}

impl ResponseOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, ResponseOutcome::Ignored)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTone {
    id: u64,
    handle: ToneHandle,
    level: HearingLevel,
    open: bool,
}

/// Drives a full two-ear test against a tone emitter
///
/// # Example
/// ```ignore
/// let mut orchestrator = TestOrchestrator::new(emitter, mapping, config, clock);
/// let first = orchestrator.start_test(Ear::Right)?;
/// let second = match orchestrator.respond_to_tone(true)? {
///     ResponseOutcome::Applied(AppliedResponse { next: NextStep::Tone(tone), .. }) => tone,
///     _ => return Ok(()),
/// };
/// // ... later tones sound after a delay; open them once they do:
/// orchestrator.open_for_response(second.id);
/// orchestrator.respond_to_tone(false)?;
/// // ... or, when the response window of `second` closes:
/// orchestrator.on_response_timeout(second.id)?;
/// ```
pub struct TestOrchestrator {
    emitter: Arc<dyn ToneEmitter>,
    mapping: CalibrationMapping,
    config: AppConfig,
    clock: Arc<dyn Clock>,
    status: TestStatus,
    starting_ear: Ear,
    current: Option<(Ear, Frequency)>,
    search: ThresholdSearch,
    pending: Option<PendingTone>,
    recorder: Option<SessionRecorder>,
    completed: Option<CompletedSession>,
    next_presentation_id: u64,
    tones_played: u64,
}

impl TestOrchestrator {
    pub fn new(
        emitter: Arc<dyn ToneEmitter>,
        mapping: CalibrationMapping,
        config: AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let search = ThresholdSearch::new(config.search.clone());
        let starting_ear = config.session.starting_ear;
        Self {
            emitter,
            mapping,
            config,
            clock,
            status: TestStatus::Idle,
            starting_ear,
            current: None,
            search,
            pending: None,
            recorder: None,
            completed: None,
            next_presentation_id: 1,
            tones_played: 0,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn mapping(&self) -> &CalibrationMapping {
        &self.mapping
    }

    /// Replace the calibration used for the next test
    ///
    /// # Errors
    /// `AudiometryError::AlreadyRunning` while a test is in progress
    pub fn set_mapping(&mut self, mapping: CalibrationMapping) -> Result<(), AudiometryError> {
        if self.is_running() {
            return Err(AudiometryError::AlreadyRunning);
        }
        self.mapping = mapping;
        Ok(())
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    /// True while a tone is pending or the emitter fault awaits a decision
    pub fn is_running(&self) -> bool {
        matches!(
            self.status,
            TestStatus::AwaitingResponse | TestStatus::EmitterFault
        )
    }

    /// Id of the presentation awaiting a response
    pub fn pending_presentation(&self) -> Option<u64> {
        self.pending.map(|p| p.id)
    }

    /// True when the pending tone is sounding and takes responses
    pub fn accepts_response(&self) -> bool {
        self.pending.is_some_and(|p| p.open)
    }

    /// Recorder of the current or most recently stopped session
    pub fn recorder(&self) -> Option<&SessionRecorder> {
        self.recorder.as_ref()
    }

    /// Session produced by the last completed test
    pub fn completed_session(&self) -> Option<&CompletedSession> {
        self.completed.as_ref()
    }

    /// Start a new test on `starting_ear`
    ///
    /// All previous session state is discarded. If the emitter refuses the
    /// first tone the test enters `EmitterFault` and the error is returned;
    /// call [`retry_presentation`](Self::retry_presentation) or
    /// [`stop_test`](Self::stop_test).
    ///
    /// # Errors
    /// - `AudiometryError::AlreadyRunning` if a test is in progress
    /// - `AudiometryError::EmitterFailure` if the first tone failed to play
    pub fn start_test(&mut self, starting_ear: Ear) -> Result<Presentation, AudiometryError> {
        if self.is_running() {
            return Err(AudiometryError::AlreadyRunning);
        }

        let session_id = Uuid::new_v4().to_string();
        log::info!(
            "[Orchestrator] Starting test {} on {} ear (calibrated={})",
            session_id,
            starting_ear,
            self.mapping.is_calibrated()
        );

        self.starting_ear = starting_ear;
        self.recorder = Some(SessionRecorder::new(
            session_id,
            starting_ear,
            self.clock.now_ms(),
        ));
        self.completed = None;
        self.pending = None;
        self.tones_played = 0;
        self.begin_pair(starting_ear, Frequency::ALL[0]);

        self.present().inspect_err(|err| {
            log_audiometry_error(err, "start_test");
        })
    }

    /// Mark `presentation_id` as sounding once its start delay has passed
    ///
    /// # Returns
    /// `true` if the tone was pending and had not been opened yet
    pub fn open_for_response(&mut self, presentation_id: u64) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.id == presentation_id && !pending.open => {
                pending.open = true;
                log::debug!(
                    "[Orchestrator] Presentation {} open for responses",
                    presentation_id
                );
                true
            }
            _ => false,
        }
    }

    /// Apply the listener's answer to the pending tone
    ///
    /// Ignored and logged when no tone is pending or the pending tone has
    /// not started sounding.
    pub fn respond_to_tone(&mut self, heard: bool) -> Result<ResponseOutcome, AudiometryError> {
        match self.pending {
            Some(pending) if pending.open => self.apply_response(heard, false),
            Some(pending) => {
                log::warn!(
                    "[Orchestrator] Response (heard={}) ignored: presentation {} has not started",
                    heard,
                    pending.id
                );
                Ok(ResponseOutcome::Ignored)
            }
            None => {
                log::warn!(
                    "[Orchestrator] Response (heard={}) ignored: no tone awaiting a response",
                    heard
                );
                Ok(ResponseOutcome::Ignored)
            }
        }
    }

    /// Record "not heard" for `presentation_id` once its window has closed
    ///
    /// Ignored when that presentation was already resolved.
    pub fn on_response_timeout(
        &mut self,
        presentation_id: u64,
    ) -> Result<ResponseOutcome, AudiometryError> {
        match self.pending {
            Some(pending) if pending.id == presentation_id => {
                log::debug!(
                    "[Orchestrator] Presentation {} timed out, recording not heard",
                    presentation_id
                );
                self.apply_response(false, true)
            }
            _ => {
                log::debug!(
                    "[Orchestrator] Stale timeout for presentation {} ignored",
                    presentation_id
                );
                Ok(ResponseOutcome::Ignored)
            }
        }
    }

    /// Playback of `presentation_id` failed after `play` returned
    ///
    /// The pending tone is withdrawn without recording a response and the
    /// test waits in `EmitterFault`.
    ///
    /// # Returns
    /// `true` if the failure belonged to the pending presentation
    pub fn on_tone_failed(&mut self, presentation_id: u64, error: EmitterError) -> bool {
        match self.pending {
            Some(pending) if pending.id == presentation_id => {
                self.pending = None;
                self.search.cancel_tone();
                self.status = TestStatus::EmitterFault;
                log_audiometry_error(
                    &AudiometryError::EmitterFailure { source: error },
                    "on_tone_failed",
                );
                true
            }
            _ => {
                log::debug!(
                    "[Orchestrator] Failure report for presentation {} ignored",
                    presentation_id
                );
                false
            }
        }
    }

    /// Present the current level again after an emitter fault
    ///
    /// # Errors
    /// - `AudiometryError::NotAwaitingRetry` if the test is not in `EmitterFault`
    /// - `AudiometryError::EmitterFailure` if the emitter failed again
    pub fn retry_presentation(&mut self) -> Result<Presentation, AudiometryError> {
        if self.status != TestStatus::EmitterFault {
            return Err(AudiometryError::NotAwaitingRetry);
        }
        log::info!("[Orchestrator] Retrying presentation after emitter fault");
        self.present().inspect_err(|err| {
            log_audiometry_error(err, "retry_presentation");
        })
    }

    /// Stop the running test
    ///
    /// The pending tone is silenced and the recorded events are kept as they
    /// are. A stopped session is neither finalized nor classified.
    ///
    /// # Errors
    /// `AudiometryError::NoActiveTest` if no test is running
    pub fn stop_test(&mut self) -> Result<(), AudiometryError> {
        if !self.is_running() {
            return Err(AudiometryError::NoActiveTest);
        }

        if let Some(pending) = self.pending.take() {
            self.silence(pending.handle);
        }
        self.search.cancel_tone();
        self.status = TestStatus::Stopped;

        log::info!(
            "[Orchestrator] Test stopped with {}/{} pairs complete",
            self.completed_pairs(),
            TOTAL_PAIRS
        );
        Ok(())
    }

    /// Progress snapshot
    pub fn progress(&self) -> TestProgress {
        let active = self.is_running();
        TestProgress {
            status: self.status,
            completed_pairs: self.completed_pairs(),
            total_pairs: TOTAL_PAIRS,
            current_ear: self.current.filter(|_| active).map(|(ear, _)| ear),
            current_frequency: self
                .current
                .filter(|_| active)
                .map(|(_, frequency)| frequency),
            phase: active.then(|| self.search.phase()),
        }
    }

    // ========================================================================
    // HELPER METHODS - Presentation and pair sequencing
    // ========================================================================

    fn completed_pairs(&self) -> usize {
        if let Some(session) = &self.completed {
            return session.audiogram().len();
        }
        self.recorder
            .as_ref()
            .map(|recorder| recorder.audiogram().len())
            .unwrap_or(0)
    }

    fn begin_pair(&mut self, ear: Ear, frequency: Frequency) {
        log::info!("[Orchestrator] Testing {} ear at {} Hz", ear, frequency.hz());
        self.current = Some((ear, frequency));
        self.search = ThresholdSearch::new(self.config.search.clone());
    }

    /// Pair after `(ear, frequency)`: rest of this ear, then the other ear
    fn next_pair(&self, ear: Ear, frequency: Frequency) -> Option<(Ear, Frequency)> {
        match frequency.next() {
            Some(next) => Some((ear, next)),
            None if ear == self.starting_ear => Some((ear.other(), Frequency::ALL[0])),
            None => None,
        }
    }

    /// Hand the current level of the current pair to the emitter
    fn present(&mut self) -> Result<Presentation, AudiometryError> {
        let (ear, frequency) = self.current.ok_or(AudiometryError::NoActiveTest)?;
        let level = self.search.present().ok_or(AudiometryError::NoActiveTest)?;

        let start_delay_ms = if self.tones_played == 0 {
            0
        } else {
            self.config.session.inter_tone_delay_ms
        };
        let request = ToneRequest {
            frequency,
            amplitude: self.mapping.amplitude(level, frequency),
            ear,
            duration_ms: self.config.session.tone_duration_ms,
            start_delay_ms,
        };

        let handle = match self.emitter.play(request) {
            Ok(handle) => handle,
            Err(source) => {
                self.search.cancel_tone();
                self.status = TestStatus::EmitterFault;
                return Err(AudiometryError::EmitterFailure { source });
            }
        };

        let id = self.next_presentation_id;
        self.next_presentation_id += 1;
        self.tones_played += 1;
        self.pending = Some(PendingTone {
            id,
            handle,
            level,
            open: start_delay_ms == 0,
        });
        self.status = TestStatus::AwaitingResponse;

        log::debug!(
            "[Orchestrator] Presentation {}: {} ear {} Hz at {} dB HL (amplitude {:.3})",
            id,
            ear,
            frequency.hz(),
            level.db(),
            request.amplitude
        );

        Ok(Presentation {
            id,
            ear,
            frequency,
            level,
            handle,
            request,
            response_window_ms: start_delay_ms + self.config.session.response_timeout_ms,
        })
    }

    fn apply_response(
        &mut self,
        heard: bool,
        timed_out: bool,
    ) -> Result<ResponseOutcome, AudiometryError> {
        let Some(pending) = self.pending.take() else {
            return Ok(ResponseOutcome::Ignored);
        };
        let (ear, frequency) = self.current.ok_or(AudiometryError::NoActiveTest)?;
        self.silence(pending.handle);

        let Some(step) = self.search.respond(heard) else {
            log::warn!(
                "[Orchestrator] Presentation {} had no active tone in the search",
                pending.id
            );
            return Ok(ResponseOutcome::Ignored);
        };

        let event = ResponseEvent {
            presentation_id: pending.id,
            ear,
            frequency,
            level: pending.level,
            heard,
            timed_out,
            timestamp_ms: self.clock.now_ms(),
        };
        let recorder = self.recorder.as_mut().ok_or(AudiometryError::NoActiveTest)?;
        recorder.record_response(event);
        log::debug!(
            "[Orchestrator] Presentation {} answered heard={} timed_out={}",
            pending.id,
            heard,
            timed_out
        );

        let (threshold, next) = match step {
            SearchStep::Present(_) => (None, self.next_tone()),
            SearchStep::Complete(threshold) => {
                recorder.record_threshold(ear, frequency, threshold);
                log::info!(
                    "[Orchestrator] Threshold for {} ear at {} Hz: {} dB HL ({:?})",
                    ear,
                    frequency.hz(),
                    threshold.db(),
                    threshold.basis
                );
                let result = PairResult {
                    ear,
                    frequency,
                    threshold,
                };
                let next = match self.next_pair(ear, frequency) {
                    Some((next_ear, next_frequency)) => {
                        self.begin_pair(next_ear, next_frequency);
                        self.next_tone()
                    }
                    None => self.complete()?,
                };
                (Some(result), next)
            }
        };

        Ok(ResponseOutcome::Applied(AppliedResponse {
            event,
            threshold,
            next,
        }))
    }

    fn next_tone(&mut self) -> NextStep {
        match self.present() {
            Ok(presentation) => NextStep::Tone(presentation),
            Err(AudiometryError::EmitterFailure { source }) => {
                log_audiometry_error(
                    &AudiometryError::EmitterFailure {
                        source: source.clone(),
                    },
                    "next_tone",
                );
                NextStep::Fault(source)
            }
            Err(err) => {
                log_audiometry_error(&err, "next_tone");
                self.status = TestStatus::EmitterFault;
                NextStep::Fault(EmitterError::DeviceUnavailable)
            }
        }
    }

    fn complete(&mut self) -> Result<NextStep, AudiometryError> {
        let recorder = self.recorder.take().ok_or(AudiometryError::NoActiveTest)?;
        let session = recorder.finalize(self.clock.now_ms())?;
        log::info!(
            "[Orchestrator] Test {} complete: {} responses, {} thresholds",
            session.id(),
            session.events().len(),
            session.audiogram().len()
        );
        self.completed = Some(session);
        self.current = None;
        self.status = TestStatus::Completed;
        Ok(NextStep::Completed)
    }

    /// Stop a tone that may still be playing; failures are not fatal
    fn silence(&self, handle: ToneHandle) {
        if let Err(err) = self.emitter.stop(handle) {
            log::debug!("[Orchestrator] Stop for tone {:?} skipped: {}", handle, err);
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
