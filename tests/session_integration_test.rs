//! Integration tests for a complete test session
//!
//! These tests drive the public API end to end with the stub emitter:
//! - Calibration loaded from a store feeds the amplitude mapping
//! - A scripted listener runs both ears to completion
//! - The completed session is classified and persisted
//! - Emitter faults and stops never produce synthetic responses
//!
//! Tones after the first carry a start delay, so each one is opened before
//! the scripted listener answers it.

use std::path::PathBuf;
use std::sync::Arc;

use puretone_audiometry::audiometry::{Frequency, TestStatus, ThresholdBasis, TOTAL_PAIRS};
use puretone_audiometry::calibration::{
    CalibrationMapping, CalibrationProfile, CalibrationStatus, CalibrationStore, DeviceInfo,
    JsonFileCalibrationStore,
};
use puretone_audiometry::classification::{ClassificationMethod, HearingClassification};
use puretone_audiometry::config::AppConfig;
use puretone_audiometry::engine::{
    NextStep, Presentation, ResponseOutcome, StubClock, StubEmitter, TestOrchestrator,
};
use puretone_audiometry::error::AudiometryError;
use puretone_audiometry::storage::{JsonDirectoryResultStore, ResultStore, SessionReport};
use puretone_audiometry::{Ear, HearingClassifier};

const NOW_MS: u64 = 1_700_000_000_000;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "puretone_it_{}_{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn orchestrator(mapping: CalibrationMapping) -> (TestOrchestrator, Arc<StubEmitter>) {
    let emitter = Arc::new(StubEmitter::new());
    let orchestrator = TestOrchestrator::new(
        emitter.clone(),
        mapping,
        AppConfig::default(),
        Arc::new(StubClock::new(NOW_MS)),
    );
    (orchestrator, emitter)
}

/// Answer every tone from per-ear, per-frequency true thresholds
fn run_listener(
    orchestrator: &mut TestOrchestrator,
    first: Presentation,
    true_db: impl Fn(Ear, Frequency) -> i32,
) -> usize {
    let mut presentation = first;
    let mut responses = 0;
    loop {
        let heard = presentation.level.db() >= true_db(presentation.ear, presentation.frequency);
        responses += 1;
        orchestrator.open_for_response(presentation.id);
        match orchestrator.respond_to_tone(heard).unwrap() {
            ResponseOutcome::Applied(applied) => match applied.next {
                NextStep::Tone(next) => presentation = next,
                NextStep::Completed => return responses,
                NextStep::Fault(err) => panic!("unexpected emitter fault: {}", err),
            },
            ResponseOutcome::Ignored => panic!("response ignored"),
        }
    }
}

#[test]
fn test_full_session_classified_and_saved() {
    let (mut orchestrator, emitter) = orchestrator(CalibrationMapping::uncalibrated());
    let first = orchestrator.start_test(Ear::Right).unwrap();

    // Right ear 20 dB everywhere; left ear slopes from 50 to 70
    let left = [50, 60, 60, 70, 70];
    let responses = run_listener(&mut orchestrator, first, |ear, frequency| match ear {
        Ear::Right => 20,
        Ear::Left => left[frequency.index()],
    });

    let session = orchestrator.completed_session().unwrap().clone();
    assert_eq!(session.audiogram().len(), TOTAL_PAIRS);
    assert_eq!(session.events().len(), responses);
    assert_eq!(emitter.play_count(), responses);
    assert!(session.completed_at_ms() > session.started_at_ms());
    assert_eq!(
        session.audiogram().levels_db(Ear::Left),
        vec![50.0, 60.0, 60.0, 70.0, 70.0]
    );

    let report = SessionReport::classify(session, &HearingClassifier::new());
    assert_eq!(report.classification.right, HearingClassification::Normal);
    assert_eq!(report.classification.left_mean_db, Some(62.0));
    assert_eq!(
        report.classification.left,
        HearingClassification::ModeratelySevere
    );
    assert_eq!(report.classification.method, ClassificationMethod::Banding);
    assert!(report.classification.is_asymmetric());

    let dir = temp_dir("saved");
    let store = JsonDirectoryResultStore::new(&dir);
    store.save(&report).unwrap();
    assert_eq!(store.load(report.session_id()).unwrap(), Some(report));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_every_pair_terminates_for_erratic_listener() {
    let (mut orchestrator, _emitter) = orchestrator(CalibrationMapping::uncalibrated());
    let mut presentation = orchestrator.start_test(Ear::Left).unwrap();
    let mut tick: u32 = 0;
    let mut responses = 0;

    loop {
        // Deterministic but irregular answers
        tick = tick.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let heard = (tick >> 16) % 3 != 0;
        responses += 1;
        orchestrator.open_for_response(presentation.id);
        match orchestrator.respond_to_tone(heard).unwrap() {
            ResponseOutcome::Applied(applied) => match applied.next {
                NextStep::Tone(next) => presentation = next,
                NextStep::Completed => break,
                NextStep::Fault(err) => panic!("unexpected emitter fault: {}", err),
            },
            ResponseOutcome::Ignored => panic!("response ignored for {:?}", presentation),
        }
    }

    assert!(responses <= 20 * TOTAL_PAIRS);
    assert_eq!(orchestrator.status(), TestStatus::Completed);
}

#[test]
fn test_floor_listener_reports_floor_thresholds() {
    let (mut orchestrator, _emitter) = orchestrator(CalibrationMapping::uncalibrated());
    let first = orchestrator.start_test(Ear::Right).unwrap();
    run_listener(&mut orchestrator, first, |_, _| -10);

    let session = orchestrator.completed_session().unwrap();
    for entry in session.audiogram().entries() {
        assert_eq!(entry.threshold.db(), -10);
        assert_eq!(entry.threshold.basis, ThresholdBasis::FloorReached);
    }
}

#[test]
fn test_calibration_from_file_store_drives_amplitudes() {
    let dir = temp_dir("calibration");
    let device = DeviceInfo::new("phone-1").with_headphone("earbuds");
    let store = JsonFileCalibrationStore::new(dir.join("profile.json"), device);
    let config = AppConfig::default();

    assert_eq!(
        store.status(NOW_MS, config.calibration.max_age_ms()).unwrap(),
        CalibrationStatus::NeedsCalibration
    );

    let profile = CalibrationProfile::new("phone-1", "earbuds", NOW_MS)
        .with_adjustment(Frequency::Hz500, 0.75)
        .unwrap()
        .with_adjustment(Frequency::Hz1000, 0.25)
        .unwrap();
    store.save(&profile).unwrap();
    assert_eq!(
        store.status(NOW_MS, config.calibration.max_age_ms()).unwrap(),
        CalibrationStatus::Calibrated
    );

    let mapping = CalibrationMapping::from_store(&store, &config.calibration, NOW_MS).unwrap();
    let (mut orchestrator, emitter) = orchestrator(mapping);
    let first = orchestrator.start_test(Ear::Right).unwrap();
    run_listener(&mut orchestrator, first, |_, _| 20);

    // Familiarization tones at 40 dB HL (0.27 raw); 2000 Hz and up fall back to 1000 Hz
    for frequency in Frequency::ALL {
        let first_tone = emitter
            .played()
            .into_iter()
            .find(|request| request.frequency == frequency)
            .unwrap();
        let expected = match frequency {
            Frequency::Hz500 => 0.405,
            _ => 0.135,
        };
        assert!(
            (first_tone.amplitude - expected).abs() < 1e-6,
            "{:?}",
            first_tone
        );
    }

    store.reset().unwrap();
    assert_eq!(
        store.status(NOW_MS, config.calibration.max_age_ms()).unwrap(),
        CalibrationStatus::NeedsRecalibration
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_emitter_fault_mid_session_then_retry_completes() {
    let (mut orchestrator, emitter) = orchestrator(CalibrationMapping::uncalibrated());
    let mut presentation = orchestrator.start_test(Ear::Right).unwrap();
    let mut faults = 0;

    loop {
        if presentation.id % 7 == 0 {
            emitter.fail_next(1);
        }
        let heard = presentation.level.db() >= 30;
        orchestrator.open_for_response(presentation.id);
        match orchestrator.respond_to_tone(heard).unwrap() {
            ResponseOutcome::Applied(applied) => match applied.next {
                NextStep::Tone(next) => presentation = next,
                NextStep::Completed => break,
                NextStep::Fault(_) => {
                    faults += 1;
                    assert_eq!(orchestrator.status(), TestStatus::EmitterFault);
                    presentation = orchestrator.retry_presentation().unwrap();
                }
            },
            ResponseOutcome::Ignored => panic!("response ignored"),
        }
    }

    assert!(faults > 0);
    let session = orchestrator.completed_session().unwrap();
    assert!(session.events().iter().all(|event| !event.timed_out));
    for entry in session.audiogram().entries() {
        assert_eq!(entry.threshold.db(), 30);
    }
}

#[test]
fn test_stopped_session_cannot_be_reported() {
    let (mut orchestrator, _emitter) = orchestrator(CalibrationMapping::uncalibrated());
    orchestrator.start_test(Ear::Right).unwrap();
    orchestrator.respond_to_tone(true).unwrap();
    orchestrator.stop_test().unwrap();

    assert!(orchestrator.completed_session().is_none());
    assert_eq!(orchestrator.recorder().unwrap().events().len(), 1);
    assert_eq!(orchestrator.stop_test(), Err(AudiometryError::NoActiveTest));
    assert_eq!(orchestrator.progress().completed_pairs, 0);
}
