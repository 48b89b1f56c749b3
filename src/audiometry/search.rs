// Threshold search - adaptive bracketing for one (ear, frequency) pair
//
// The search follows a bounded modified Hughson-Westlake procedure:
// 1. Familiarization: start at an audible level, raise in large steps until heard
// 2. Descending: drop in 10 dB steps while the tone is heard
// 3. Ascending: climb in 5 dB steps, confirming a level on 2 of 3 responses
// 4. Confirmed: threshold fixed
//
// All search state lives in `SearchState`, a plain serializable record. The
// `transition` function consumes a state plus one response and returns the
// next state together with what the caller must do next, so the procedure can
// be tested without tones, timers, or an orchestrator.

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::HearingLevel;
use crate::config::SearchConfig;

/// Phase of the bracketing procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Familiarization,
    Descending,
    Ascending,
    /// Terminal: threshold fixed
    Confirmed,
}

impl SearchPhase {
    /// Get human-readable name for display
    pub fn display_name(self) -> &'static str {
        match self {
            SearchPhase::Familiarization => "FAMILIARIZATION",
            SearchPhase::Descending => "DESCENDING",
            SearchPhase::Ascending => "ASCENDING",
            SearchPhase::Confirmed => "CONFIRMED",
        }
    }
}

/// How a threshold was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBasis {
    /// Ascending positive-response consensus
    Converged,
    /// Still heard at the quietest level while descending
    FloorReached,
    /// Per-level response cap hit without consensus
    AttemptLimit,
    /// Per-pair presentation cap hit
    PresentationLimit,
    /// Not heard at the loudest level
    NoResponse,
}

/// Final hearing level for one (ear, frequency) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub level: HearingLevel,
    pub basis: ThresholdBasis,
}

impl Threshold {
    pub fn new(level: HearingLevel, basis: ThresholdBasis) -> Self {
        Self { level, basis }
    }

    /// Saturated marker, reported at the top of the ladder
    pub fn no_response() -> Self {
        Self::new(HearingLevel::MAX, ThresholdBasis::NoResponse)
    }

    pub fn is_no_response(&self) -> bool {
        self.basis == ThresholdBasis::NoResponse
    }

    /// Threshold value in dB HL
    pub fn db(&self) -> i32 {
        self.level.db()
    }
}

/// Complete state of one pair's search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchState {
    pub phase: SearchPhase,
    /// Level of the next (or currently playing) tone
    pub level: HearingLevel,
    /// Responses at the current ascending level
    pub response_count: u8,
    /// Heard responses at the current ascending level
    pub positive_response_count: u8,
    /// Responses applied so far for this pair
    pub presentations: u16,
    /// The loudest level was heard at least once
    #[serde(default)]
    pub heard_at_max: bool,
    /// Set once the phase is `Confirmed`
    pub threshold: Option<Threshold>,
}

impl SearchState {
    /// Fresh search at the configured starting level
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            phase: SearchPhase::Familiarization,
            level: config.starting_level(),
            response_count: 0,
            positive_response_count: 0,
            presentations: 0,
            heard_at_max: false,
            threshold: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.phase == SearchPhase::Confirmed
    }

    fn reset_counters(&mut self) {
        self.response_count = 0;
        self.positive_response_count = 0;
    }

    fn finalize(&mut self, threshold: Threshold) -> SearchStep {
        self.phase = SearchPhase::Confirmed;
        self.level = threshold.level;
        self.threshold = Some(threshold);
        SearchStep::Complete(threshold)
    }
}

/// What the caller must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    /// Play another tone at this level
    Present(HearingLevel),
    /// Search finished with this threshold
    Complete(Threshold),
}

/// Outcome of applying one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: SearchState,
    pub step: SearchStep,
}

/// Apply one response to a search state
///
/// A confirmed state is returned unchanged. Every other call counts as one
/// presentation; once `max_presentations` responses have been applied the
/// search finalizes at the current level even if no phase rule fired.
pub fn transition(state: SearchState, heard: bool, config: &SearchConfig) -> Transition {
    let mut next = state;

    if let Some(threshold) = state.threshold.filter(|_| state.is_confirmed()) {
        return Transition {
            state: next,
            step: SearchStep::Complete(threshold),
        };
    }

    next.presentations = next.presentations.saturating_add(1);
    if heard && next.level.is_max() {
        next.heard_at_max = true;
    }

    let step = match (next.phase, heard) {
        (SearchPhase::Familiarization, true) => {
            next.phase = SearchPhase::Descending;
            SearchStep::Present(next.level)
        }
        (SearchPhase::Familiarization, false) => {
            let raised = next.level.raise(config.familiarization_step_db);
            if raised.moved {
                next.level = raised.level;
                SearchStep::Present(next.level)
            } else {
                next.finalize(Threshold::no_response())
            }
        }
        (SearchPhase::Descending, true) => {
            let lowered = next.level.lower(config.descending_step_db);
            if lowered.moved {
                next.level = lowered.level;
                SearchStep::Present(next.level)
            } else {
                next.finalize(Threshold::new(next.level, ThresholdBasis::FloorReached))
            }
        }
        (SearchPhase::Descending, false) => {
            next.phase = SearchPhase::Ascending;
            next.reset_counters();
            raise_after_miss(&mut next, config)
        }
        (SearchPhase::Ascending, true) => {
            next.response_count = next.response_count.saturating_add(1);
            next.positive_response_count = next.positive_response_count.saturating_add(1);

            if next.positive_response_count >= config.required_positive
                && next.response_count >= config.min_responses
            {
                next.finalize(Threshold::new(next.level, ThresholdBasis::Converged))
            } else if next.response_count >= config.max_responses_per_level {
                next.finalize(Threshold::new(next.level, ThresholdBasis::AttemptLimit))
            } else {
                SearchStep::Present(next.level)
            }
        }
        (SearchPhase::Ascending, false) => {
            next.reset_counters();
            raise_after_miss(&mut next, config)
        }
        (SearchPhase::Confirmed, _) => {
            // Confirmed without a threshold only happens for hand-built states
            next.finalize(Threshold::new(next.level, ThresholdBasis::PresentationLimit))
        }
    };

    let step = match step {
        SearchStep::Present(_) if next.presentations >= config.max_presentations => {
            log::warn!(
                "[ThresholdSearch] Presentation cap {} reached at {}, accepting current level",
                config.max_presentations,
                next.level
            );
            next.finalize(Threshold::new(next.level, ThresholdBasis::PresentationLimit))
        }
        other => other,
    };

    Transition { state: next, step }
}

/// Climb one ascending step
///
/// At the loudest level the tone is replayed if it was ever heard there;
/// otherwise the pair has no response.
fn raise_after_miss(state: &mut SearchState, config: &SearchConfig) -> SearchStep {
    let raised = state.level.raise(config.ascending_step_db);
    if raised.moved {
        state.level = raised.level;
        SearchStep::Present(state.level)
    } else if state.heard_at_max {
        SearchStep::Present(state.level)
    } else {
        state.finalize(Threshold::no_response())
    }
}

/// ThresholdSearch drives one pair and guards against responses with no tone playing
#[derive(Debug, Clone)]
pub struct ThresholdSearch {
    state: SearchState,
    config: SearchConfig,
    tone_active: bool,
}

impl ThresholdSearch {
    /// Create a new search at the configured starting level
    pub fn new(config: SearchConfig) -> Self {
        Self {
            state: SearchState::new(&config),
            config,
            tone_active: false,
        }
    }

    /// Resume from a previously captured state
    pub fn from_state(state: SearchState, config: SearchConfig) -> Self {
        Self {
            state,
            config,
            tone_active: false,
        }
    }

    /// Snapshot of the current search state
    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn phase(&self) -> SearchPhase {
        self.state.phase
    }

    pub fn threshold(&self) -> Option<Threshold> {
        self.state.threshold
    }

    pub fn is_tone_active(&self) -> bool {
        self.tone_active
    }

    /// Mark a tone as playing at the current level
    ///
    /// # Returns
    /// * `Some(HearingLevel)` - Level to play
    /// * `None` - Search already confirmed
    pub fn present(&mut self) -> Option<HearingLevel> {
        if self.state.is_confirmed() {
            return None;
        }
        self.tone_active = true;
        Some(self.state.level)
    }

    /// Withdraw the active tone without recording a response
    pub fn cancel_tone(&mut self) {
        self.tone_active = false;
    }

    /// Apply a response to the active tone
    ///
    /// # Returns
    /// * `Some(SearchStep)` - Response applied
    /// * `None` - No tone was active; the response is ignored
    pub fn respond(&mut self, heard: bool) -> Option<SearchStep> {
        if !self.tone_active {
            log::debug!("[ThresholdSearch] Response ignored: no active tone");
            return None;
        }
        self.tone_active = false;

        let Transition { state, step } = transition(self.state, heard, &self.config);
        self.state = state;
        Some(step)
    }
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
