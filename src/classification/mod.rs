// Classification module - severity categories and recommendations
//
// 1. banding: Mean threshold to HearingClassification with half-open bands
// 2. recommendations: Pure recommendation list for a pair of classifications
// 3. model: Optional model classifier boundary and eligibility rule
// 4. classifier: HearingClassifier combining the three with banding as fallback

pub mod banding;
pub mod classifier;
pub mod model;
pub mod recommendations;

pub use banding::{classify_levels, mean_threshold, HearingClassification};
pub use classifier::{ClassificationMethod, ClassificationReport, HearingClassifier};
pub use model::{model_eligible, EarReading, ModelClassifier, MODEL_MIN_FREQUENCIES};
pub use recommendations::{recommendations, ASYMMETRY_NOTE};
