//! Engine module running tests against a tone emitter.
//!
//! `orchestrator` is the synchronous test state machine. `manager` wraps it
//! with Tokio response timers and a broadcast event stream. `emitter` and
//! `clock` are the injected collaborators, with deterministic stubs for tests
//! and tooling.

pub mod clock;
pub mod emitter;
pub mod events;
pub mod manager;
pub mod orchestrator;

pub use clock::{Clock, StubClock, SystemClock};
pub use emitter::{StubEmitter, ToneEmitter, ToneHandle, ToneRequest};
pub use events::TestEvent;
pub use manager::AudiometryManager;
pub use orchestrator::{
    AppliedResponse, NextStep, PairResult, Presentation, ResponseOutcome, TestOrchestrator,
};
