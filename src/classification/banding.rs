// Severity banding - mean threshold to hearing loss category
//
// Bands are half-open with an exclusive upper bound (dB HL):
//   [-10, 25) Normal
//   [25, 40)  Mild
//   [40, 55)  Moderate
//   [55, 70)  Moderately severe
//   [70, 90)  Severe
//   [90, inf) Profound
//
// An ear with no usable thresholds classifies as Normal. This is a screening
// convention: callers that need to distinguish "untested" from "normal" must
// inspect the mean, which is `None` in that case.

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::Ear;
use crate::error::{ClassificationError, ErrorCode};

/// Hearing loss category, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HearingClassification {
    Normal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
    Profound,
}

/// Exclusive upper bound of every band but the last
const BAND_UPPER_BOUNDS: [(f32, HearingClassification); 5] = [
    (25.0, HearingClassification::Normal),
    (40.0, HearingClassification::Mild),
    (55.0, HearingClassification::Moderate),
    (70.0, HearingClassification::ModeratelySevere),
    (90.0, HearingClassification::Severe),
];

impl HearingClassification {
    /// Every category from least to most severe
    pub const ALL: [HearingClassification; 6] = [
        HearingClassification::Normal,
        HearingClassification::Mild,
        HearingClassification::Moderate,
        HearingClassification::ModeratelySevere,
        HearingClassification::Severe,
        HearingClassification::Profound,
    ];

    /// Band a mean threshold; NaN falls back to Normal
    pub fn from_mean_db(mean_db: f32) -> Self {
        if mean_db.is_nan() {
            return HearingClassification::Normal;
        }
        BAND_UPPER_BOUNDS
            .iter()
            .find(|(upper, _)| mean_db < *upper)
            .map(|(_, classification)| *classification)
            .unwrap_or(HearingClassification::Profound)
    }

    /// Inclusive lower bound of this band (dB HL)
    pub fn lower_bound_db(self) -> f32 {
        match self {
            HearingClassification::Normal => -10.0,
            HearingClassification::Mild => 25.0,
            HearingClassification::Moderate => 40.0,
            HearingClassification::ModeratelySevere => 55.0,
            HearingClassification::Severe => 70.0,
            HearingClassification::Profound => 90.0,
        }
    }

    /// Get human-readable name for display
    pub fn display_name(self) -> &'static str {
        match self {
            HearingClassification::Normal => "Normal",
            HearingClassification::Mild => "Mild",
            HearingClassification::Moderate => "Moderate",
            HearingClassification::ModeratelySevere => "Moderately Severe",
            HearingClassification::Severe => "Severe",
            HearingClassification::Profound => "Profound",
        }
    }
}

/// Arithmetic mean of the finite values, `None` if there are none
pub fn mean_threshold(levels_db: &[f32]) -> Option<f32> {
    let finite: Vec<f32> = levels_db.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f32>() / finite.len() as f32)
}

/// Classify one ear's thresholds
///
/// # Errors
/// `ClassificationError::InsufficientData` when no finite threshold exists
pub fn classify_levels(
    ear: Ear,
    levels_db: &[f32],
) -> Result<HearingClassification, ClassificationError> {
    mean_threshold(levels_db)
        .map(HearingClassification::from_mean_db)
        .ok_or(ClassificationError::InsufficientData { ear })
}

/// Classify one ear, defaulting to Normal when there is nothing to average
pub fn classify_levels_or_default(ear: Ear, levels_db: &[f32]) -> HearingClassification {
    classify_levels(ear, levels_db).unwrap_or_else(|err| {
        log::warn!(
            "[Classifier] code={} {}; defaulting to Normal",
            err.code(),
            err.message()
        );
        HearingClassification::Normal
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges_are_half_open() {
        let cases = [
            (-10.0, HearingClassification::Normal),
            (24.999, HearingClassification::Normal),
            (25.0, HearingClassification::Mild),
            (39.999, HearingClassification::Mild),
            (40.0, HearingClassification::Moderate),
            (54.999, HearingClassification::Moderate),
            (55.0, HearingClassification::ModeratelySevere),
            (69.999, HearingClassification::ModeratelySevere),
            (70.0, HearingClassification::Severe),
            (89.999, HearingClassification::Severe),
            (90.0, HearingClassification::Profound),
            (120.0, HearingClassification::Profound),
        ];
        for (mean, expected) in cases {
            assert_eq!(
                HearingClassification::from_mean_db(mean),
                expected,
                "mean {}",
                mean
            );
        }
    }

    #[test]
    fn test_lower_bounds_classify_into_their_own_band() {
        for classification in HearingClassification::ALL {
            assert_eq!(
                HearingClassification::from_mean_db(classification.lower_bound_db()),
                classification
            );
        }
    }

    #[test]
    fn test_ordering_by_severity() {
        assert!(HearingClassification::Normal < HearingClassification::Mild);
        assert!(HearingClassification::Severe < HearingClassification::Profound);
        assert_eq!(
            HearingClassification::ALL.iter().max(),
            Some(&HearingClassification::Profound)
        );
    }

    #[test]
    fn test_mean_threshold_ignores_non_finite() {
        assert_eq!(mean_threshold(&[10.0, 20.0, f32::NAN, 30.0]), Some(20.0));
        assert_eq!(mean_threshold(&[]), None);
        assert_eq!(mean_threshold(&[f32::INFINITY]), None);
    }

    #[test]
    fn test_classify_levels_insufficient_data() {
        assert_eq!(
            classify_levels(Ear::Left, &[]),
            Err(ClassificationError::InsufficientData { ear: Ear::Left })
        );
        assert_eq!(
            classify_levels_or_default(Ear::Left, &[]),
            HearingClassification::Normal
        );
    }

    #[test]
    fn test_classify_levels_uses_mean() {
        assert_eq!(
            classify_levels(Ear::Right, &[50.0, 60.0, 70.0, 65.0, 65.0]),
            Ok(HearingClassification::ModeratelySevere)
        );
    }

    #[test]
    fn test_nan_mean_is_normal() {
        assert_eq!(
            HearingClassification::from_mean_db(f32::NAN),
            HearingClassification::Normal
        );
    }
}
