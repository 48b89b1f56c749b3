//! Events broadcast by the audiometry manager while a test runs.

use serde::{Deserialize, Serialize};

use crate::audiometry::progress::TestProgress;
use crate::audiometry::scale::{Ear, Frequency, HearingLevel};
use crate::audiometry::search::Threshold;
use crate::audiometry::session::ResponseEvent;
use crate::engine::orchestrator::Presentation;

/// Test lifecycle events for UI and tooling subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TestEvent {
    TestStarted {
        session_id: String,
        starting_ear: Ear,
    },
    TonePresented {
        presentation_id: u64,
        ear: Ear,
        frequency: Frequency,
        level: HearingLevel,
        amplitude: f32,
        start_delay_ms: u64,
        response_window_ms: u64,
    },
    /// The tone is sounding; listener responses count from here on
    ToneStarted {
        presentation_id: u64,
        ear: Ear,
        frequency: Frequency,
        level: HearingLevel,
    },
    ResponseRecorded(ResponseEvent),
    ThresholdFound {
        ear: Ear,
        frequency: Frequency,
        threshold: Threshold,
    },
    /// Emitter failed; the test waits for retry or stop
    EmitterFault {
        presentation_id: Option<u64>,
        code: i32,
        message: String,
    },
    Progress(TestProgress),
    SessionCompleted {
        session_id: String,
    },
    TestStopped {
        completed_pairs: usize,
    },
}

impl TestEvent {
    pub fn tone_presented(presentation: &Presentation) -> Self {
        TestEvent::TonePresented {
            presentation_id: presentation.id,
            ear: presentation.ear,
            frequency: presentation.frequency,
            level: presentation.level,
            amplitude: presentation.request.amplitude,
            start_delay_ms: presentation.request.start_delay_ms,
            response_window_ms: presentation.response_window_ms,
        }
    }

    pub fn tone_started(presentation: &Presentation) -> Self {
        TestEvent::ToneStarted {
            presentation_id: presentation.id,
            ear: presentation.ear,
            frequency: presentation.frequency,
            level: presentation.level,
        }
    }

    /// True for events after which no tone is pending until the caller acts
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestEvent::SessionCompleted { .. } | TestEvent::TestStopped { .. }
        )
    }
}
