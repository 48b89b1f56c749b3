// Optional model-based classifier boundary
//
// A model classifier sees the same per-ear readings as the banding rule and
// must return one category per ear. It is consulted only when both ears have
// thresholds at enough distinct standard frequencies.

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::{Ear, Frequency};
use crate::audiometry::session::Audiogram;
use crate::classification::banding::HearingClassification;
use crate::error::ClassificationError;

/// Distinct standard frequencies each ear needs before a model is consulted
pub const MODEL_MIN_FREQUENCIES: usize = 3;

/// One hearing level reading for an ear
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarReading {
    pub frequency: Frequency,
    pub level_db: f32,
}

impl EarReading {
    pub fn new(frequency: Frequency, level_db: f32) -> Self {
        Self {
            frequency,
            level_db,
        }
    }
}

/// Readings for one ear taken from an audiogram
pub fn readings_for_ear(audiogram: &Audiogram, ear: Ear) -> Vec<EarReading> {
    audiogram
        .for_ear(ear)
        .into_iter()
        .map(|(frequency, threshold)| EarReading::new(frequency, threshold.db() as f32))
        .collect()
}

/// Externally provided classifier, e.g. a trained model
pub trait ModelClassifier: Send + Sync {
    /// Classify (right, left)
    ///
    /// Any error makes the caller fall back to banding.
    fn classify(
        &self,
        right: &[EarReading],
        left: &[EarReading],
    ) -> Result<(HearingClassification, HearingClassification), ClassificationError>;
}

fn distinct_frequencies(readings: &[EarReading]) -> usize {
    let mut seen = [false; Frequency::ALL.len()];
    for reading in readings.iter().filter(|r| r.level_db.is_finite()) {
        seen[reading.frequency.index()] = true;
    }
    seen.iter().filter(|s| **s).count()
}

/// Whether both ears have enough coverage for a model
pub fn model_eligible(right: &[EarReading], left: &[EarReading]) -> bool {
    distinct_frequencies(right) >= MODEL_MIN_FREQUENCIES
        && distinct_frequencies(left) >= MODEL_MIN_FREQUENCIES
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(frequencies: &[Frequency]) -> Vec<EarReading> {
        frequencies.iter().map(|f| EarReading::new(*f, 20.0)).collect()
    }

    #[test]
    fn test_eligible_with_three_frequencies_each() {
        let three = readings(&[Frequency::Hz500, Frequency::Hz1000, Frequency::Hz2000]);
        assert!(model_eligible(&three, &three));
    }

    #[test]
    fn test_not_eligible_when_one_ear_is_short() {
        let three = readings(&[Frequency::Hz500, Frequency::Hz1000, Frequency::Hz2000]);
        let two = readings(&[Frequency::Hz500, Frequency::Hz1000]);
        assert!(!model_eligible(&three, &two));
        assert!(!model_eligible(&two, &three));
    }

    #[test]
    fn test_repeated_frequency_counts_once() {
        let repeated = readings(&[Frequency::Hz500, Frequency::Hz500, Frequency::Hz500]);
        let three = readings(&[Frequency::Hz500, Frequency::Hz1000, Frequency::Hz2000]);
        assert!(!model_eligible(&repeated, &three));
    }

    #[test]
    fn test_non_finite_readings_do_not_count() {
        let mut three = readings(&[Frequency::Hz500, Frequency::Hz1000, Frequency::Hz2000]);
        let good = three.clone();
        three[2].level_db = f32::NAN;
        assert!(!model_eligible(&three, &good));
    }
}
