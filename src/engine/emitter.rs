//! Tone emitter boundary.
//!
//! The engine never touches audio buffers. It hands a [`ToneRequest`] to a
//! [`ToneEmitter`] and gets back an opaque [`ToneHandle`]. Playback failures
//! that happen after `play` returned are reported back to the engine with the
//! presentation id (see `AudiometryManager::report_tone_failure`).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::{Ear, Frequency};
use crate::error::EmitterError;

/// A single pure tone to play
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneRequest {
    pub frequency: Frequency,
    /// Device-relative amplitude in [0, 1]
    pub amplitude: f32,
    pub ear: Ear,
    pub duration_ms: u64,
    /// Silence before the tone starts
    pub start_delay_ms: u64,
}

/// Opaque handle for a playing tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToneHandle(pub u64);

/// Trait implemented by tone output backends.
pub trait ToneEmitter: Send + Sync {
    fn play(&self, request: ToneRequest) -> Result<ToneHandle, EmitterError>;
    fn stop(&self, handle: ToneHandle) -> Result<(), EmitterError>;
}

/// Stub emitter used for deterministic testing and CLI tooling.
///
/// Records every request instead of producing sound. Failures can be scripted
/// with [`StubEmitter::fail_next`].
#[derive(Debug, Default)]
pub struct StubEmitter {
    next_handle: AtomicU64,
    failures_pending: AtomicU32,
    played: Mutex<Vec<ToneRequest>>,
    live: Mutex<Vec<ToneHandle>>,
}

impl StubEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `play` fail
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Every request accepted so far, in order
    pub fn played(&self) -> Vec<ToneRequest> {
        self.played
            .lock()
            .map(|played| played.clone())
            .unwrap_or_default()
    }

    pub fn play_count(&self) -> usize {
        self.played.lock().map(|played| played.len()).unwrap_or(0)
    }

    /// Handles that were played and not yet stopped
    pub fn live_handles(&self) -> Vec<ToneHandle> {
        self.live.lock().map(|live| live.clone()).unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        self.failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ToneEmitter for StubEmitter {
    fn play(&self, request: ToneRequest) -> Result<ToneHandle, EmitterError> {
        if self.take_failure() {
            return Err(EmitterError::PlaybackFailed {
                reason: "scripted stub failure".to_string(),
            });
        }

        let handle = ToneHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.played
            .lock()
            .map_err(|_| EmitterError::DeviceUnavailable)?
            .push(request);
        self.live
            .lock()
            .map_err(|_| EmitterError::DeviceUnavailable)?
            .push(handle);
        Ok(handle)
    }

    fn stop(&self, handle: ToneHandle) -> Result<(), EmitterError> {
        let mut live = self
            .live
            .lock()
            .map_err(|_| EmitterError::DeviceUnavailable)?;
        match live.iter().position(|h| *h == handle) {
            Some(index) => {
                live.remove(index);
                Ok(())
            }
            None => Err(EmitterError::UnknownHandle { handle: handle.0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ToneRequest {
        ToneRequest {
            frequency: Frequency::Hz1000,
            amplitude: 0.27,
            ear: Ear::Right,
            duration_ms: 1000,
            start_delay_ms: 0,
        }
    }

    #[test]
    fn test_play_records_request() {
        let emitter = StubEmitter::new();
        let handle = emitter.play(request()).unwrap();
        assert_eq!(emitter.played(), vec![request()]);
        assert_eq!(emitter.live_handles(), vec![handle]);
    }

    #[test]
    fn test_handles_are_unique() {
        let emitter = StubEmitter::new();
        let a = emitter.play(request()).unwrap();
        let b = emitter.play(request()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_stop_releases_handle_once() {
        let emitter = StubEmitter::new();
        let handle = emitter.play(request()).unwrap();
        assert!(emitter.stop(handle).is_ok());
        assert_eq!(
            emitter.stop(handle),
            Err(EmitterError::UnknownHandle { handle: handle.0 })
        );
    }

    #[test]
    fn test_scripted_failures() {
        let emitter = StubEmitter::new();
        emitter.fail_next(2);
        assert!(matches!(
            emitter.play(request()),
            Err(EmitterError::PlaybackFailed { .. })
        ));
        assert!(emitter.play(request()).is_err());
        assert!(emitter.play(request()).is_ok());
        assert_eq!(emitter.play_count(), 1);
    }
}
