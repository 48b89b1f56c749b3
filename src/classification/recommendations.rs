// Recommendation text derived from the two ear classifications
//
// The list depends only on the worse ear plus an asymmetry note when the ears
// differ, so identical inputs always produce identical, duplicate-free output.

use crate::classification::banding::HearingClassification;

/// Appended whenever the two ears fall into different bands
pub const ASYMMETRY_NOTE: &str =
    "Hearing differs between ears; the asymmetry should be evaluated by an audiologist.";

fn base_recommendations(classification: HearingClassification) -> &'static [&'static str] {
    match classification {
        HearingClassification::Normal => &[
            "Hearing is within the normal range.",
            "Repeat the screening every year or sooner if you notice changes.",
        ],
        HearingClassification::Mild => &[
            "Mild hearing loss detected.",
            "Consider a full evaluation by an audiologist.",
            "Limit exposure to loud noise and use hearing protection.",
        ],
        HearingClassification::Moderate => &[
            "Moderate hearing loss detected.",
            "Schedule an evaluation with an audiologist.",
            "Hearing aids may improve speech understanding.",
        ],
        HearingClassification::ModeratelySevere => &[
            "Moderately severe hearing loss detected.",
            "Schedule an evaluation with an audiologist.",
            "Hearing aids are likely to help.",
            "Ask about assistive listening devices.",
        ],
        HearingClassification::Severe => &[
            "Severe hearing loss detected.",
            "See an audiologist or ENT specialist promptly.",
            "Powerful hearing aids or cochlear implants may be discussed.",
            "Ask about assistive listening devices.",
        ],
        HearingClassification::Profound => &[
            "Profound hearing loss detected.",
            "See an audiologist or ENT specialist promptly.",
            "Cochlear implant candidacy may be discussed.",
            "Consider visual alerting devices and communication strategies.",
        ],
    }
}

/// Ordered, deduplicated recommendations for a pair of ear classifications
pub fn recommendations(
    right: HearingClassification,
    left: HearingClassification,
) -> Vec<String> {
    let worse = right.max(left);
    let asymmetry = (right != left).then_some(ASYMMETRY_NOTE);

    let mut list: Vec<String> = Vec::new();
    for text in base_recommendations(worse).iter().copied().chain(asymmetry) {
        if !list.iter().any(|existing| existing == text) {
            list.push(text.to_string());
        }
    }
    list
}
