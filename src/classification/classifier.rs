// HearingClassifier - per-ear severity plus recommendations for a session
//
// Classification always converges. When a model classifier is configured and
// both ears have enough coverage it is asked first; if it is missing, refuses
// the input, or fails, the banding rule decides. Every fallback is logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audiometry::scale::Ear;
use crate::audiometry::session::Audiogram;
use crate::classification::banding::{
    classify_levels_or_default, mean_threshold, HearingClassification,
};
use crate::classification::model::{model_eligible, readings_for_ear, EarReading, ModelClassifier};
use crate::classification::recommendations::recommendations;
use crate::error::{ClassificationError, ErrorCode};

/// Which path produced the classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Banding,
    Model,
}

/// Classification of both ears with the derived recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub right: HearingClassification,
    pub left: HearingClassification,
    /// Mean threshold per ear; `None` when the ear had nothing to average
    pub right_mean_db: Option<f32>,
    pub left_mean_db: Option<f32>,
    pub method: ClassificationMethod,
    pub recommendations: Vec<String>,
}

impl ClassificationReport {
    pub fn for_ear(&self, ear: Ear) -> HearingClassification {
        match ear {
            Ear::Right => self.right,
            Ear::Left => self.left,
        }
    }

    /// More severe of the two ears
    pub fn worse(&self) -> HearingClassification {
        self.right.max(self.left)
    }

    pub fn is_asymmetric(&self) -> bool {
        self.right != self.left
    }
}

/// Classifier with an optional model in front of the banding rule
#[derive(Clone, Default)]
pub struct HearingClassifier {
    model: Option<Arc<dyn ModelClassifier>>,
}

impl HearingClassifier {
    /// Banding-only classifier
    pub fn new() -> Self {
        Self { model: None }
    }

    /// Consult `model` first when the input is eligible
    pub fn with_model(model: Arc<dyn ModelClassifier>) -> Self {
        Self { model: Some(model) }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify a session's audiogram
    pub fn classify(&self, audiogram: &Audiogram) -> ClassificationReport {
        let right = readings_for_ear(audiogram, Ear::Right);
        let left = readings_for_ear(audiogram, Ear::Left);
        self.classify_readings(&right, &left)
    }

    /// Classify raw per-ear readings
    pub fn classify_readings(
        &self,
        right: &[EarReading],
        left: &[EarReading],
    ) -> ClassificationReport {
        let right_levels = levels(right);
        let left_levels = levels(left);

        let (right_class, left_class, method) = match self.try_model(right, left) {
            Ok((r, l)) => (r, l, ClassificationMethod::Model),
            Err(err) => {
                if self.model.is_some() {
                    log::warn!(
                        "[Classifier] Model path skipped (code={}): {}; using banding",
                        err.code(),
                        err.message()
                    );
                }
                (
                    classify_levels_or_default(Ear::Right, &right_levels),
                    classify_levels_or_default(Ear::Left, &left_levels),
                    ClassificationMethod::Banding,
                )
            }
        };

        log::info!(
            "[Classifier] right={} left={} via {:?}",
            right_class.display_name(),
            left_class.display_name(),
            method
        );

        ClassificationReport {
            right: right_class,
            left: left_class,
            right_mean_db: mean_threshold(&right_levels),
            left_mean_db: mean_threshold(&left_levels),
            method,
            recommendations: recommendations(right_class, left_class),
        }
    }

    fn try_model(
        &self,
        right: &[EarReading],
        left: &[EarReading],
    ) -> Result<(HearingClassification, HearingClassification), ClassificationError> {
        let model = self
            .model
            .as_ref()
            .ok_or(ClassificationError::ModelUnavailable)?;

        if !model_eligible(right, left) {
            // Report the first ear lacking coverage
            let ear = if model_eligible(right, right) {
                Ear::Left
            } else {
                Ear::Right
            };
            return Err(ClassificationError::InsufficientData { ear });
        }

        model.classify(right, left)
    }
}

fn levels(readings: &[EarReading]) -> Vec<f32> {
    readings.iter().map(|r| r.level_db).collect()
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
