//! Collapses backend pipeline stage identifiers onto coarse UI steps.
//!
//! The backend exposes roughly ten fine-grained stages (`stage01_normalize`
//! through `stage10_policy`) and renames or adds stages over time. The table
//! below is sparse and ordered: the first matching entry wins and an
//! identifier that matches nothing simply has no step.

use StageMatcher::{Contains, Prefix};

/// Number of coarse UI steps exposed for progress display.
pub const UI_STEP_COUNT: u8 = 4;

const CLAIM_ANALYSIS: &str = "Claim analysis";
const EVIDENCE_COLLECTION: &str = "Evidence collection";
const SKEPTICAL_VERIFICATION: &str = "Skeptical verification";
const VERDICT_AGGREGATION: &str = "Verdict aggregation";

/// Coarse progress step derived from a stage identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UiStep {
    /// One-based ordinal, at most `UI_STEP_COUNT`.
    pub index: u8,
    /// Display title.
    pub title: &'static str,
}

#[derive(Clone, Copy, Debug)]
enum StageMatcher {
    Prefix(&'static str),
    Contains(&'static str),
}

impl StageMatcher {
    fn matches(self, stage: &str) -> bool {
        match self {
            Self::Prefix(prefix) => stage.starts_with(prefix),
            Self::Contains(needle) => stage.contains(needle),
        }
    }
}

struct StageEntry {
    matcher: StageMatcher,
    step: UiStep,
}

const fn entry(matcher: StageMatcher, index: u8, title: &'static str) -> StageEntry {
    StageEntry {
        matcher,
        step: UiStep { index, title },
    }
}

static STAGE_TABLE: [StageEntry; 17] = [
    entry(Prefix("stage01"), 1, CLAIM_ANALYSIS),
    entry(Prefix("stage02"), 1, CLAIM_ANALYSIS),
    entry(Prefix("stage03"), 2, EVIDENCE_COLLECTION),
    entry(Prefix("stage04"), 2, EVIDENCE_COLLECTION),
    entry(Prefix("stage05"), 2, EVIDENCE_COLLECTION),
    entry(Prefix("stage06"), 3, SKEPTICAL_VERIFICATION),
    entry(Prefix("stage07"), 3, SKEPTICAL_VERIFICATION),
    entry(Prefix("stage08"), 4, VERDICT_AGGREGATION),
    entry(Prefix("stage09"), 4, VERDICT_AGGREGATION),
    entry(Prefix("stage10"), 4, VERDICT_AGGREGATION),
    // Keyword fallbacks for stages renamed away from the numbered scheme.
    entry(Contains("normalize"), 1, CLAIM_ANALYSIS),
    entry(Contains("querygen"), 1, CLAIM_ANALYSIS),
    entry(Contains("evidence"), 2, EVIDENCE_COLLECTION),
    entry(Contains("verify"), 3, SKEPTICAL_VERIFICATION),
    entry(Contains("aggregate"), 4, VERDICT_AGGREGATION),
    entry(Contains("judge"), 4, VERDICT_AGGREGATION),
    entry(Contains("policy"), 4, VERDICT_AGGREGATION),
];

/// Looks up the UI step for a backend stage identifier.
pub fn ui_step_for_stage(stage: &str) -> Option<UiStep> {
    let stage = stage.trim();
    if stage.is_empty() {
        return None;
    }
    STAGE_TABLE
        .iter()
        .find(|entry| entry.matcher.matches(stage))
        .map(|entry| entry.step)
}

/// Titles of all UI steps, ordered by index.
pub fn ui_step_titles() -> [&'static str; UI_STEP_COUNT as usize] {
    [
        CLAIM_ANALYSIS,
        EVIDENCE_COLLECTION,
        SKEPTICAL_VERIFICATION,
        VERDICT_AGGREGATION,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_stages_collapse_onto_four_steps() {
        let expected = [
            ("stage01_normalize", 1),
            ("stage02_querygen", 1),
            ("stage03_web", 2),
            ("stage03_wiki", 2),
            ("stage04_score", 2),
            ("stage05_topk", 2),
            ("stage06_verify_support", 3),
            ("stage07_verify_skeptic", 3),
            ("stage08_aggregate", 4),
            ("stage09_judge", 4),
            ("stage10_policy", 4),
        ];
        for (stage, index) in expected {
            let step = ui_step_for_stage(stage).expect(stage);
            assert_eq!(step.index, index, "{stage}");
        }
    }

    #[test]
    fn evidence_stage_has_evidence_title() {
        let step = ui_step_for_stage("stage03_web").expect("mapped");
        assert_eq!(step.title, EVIDENCE_COLLECTION);
    }

    #[test]
    fn renamed_stage_falls_back_to_keyword() {
        let step = ui_step_for_stage("verify_contradictions").expect("mapped");
        assert_eq!(step.index, 3);
    }

    #[test]
    fn unknown_or_empty_stage_has_no_step() {
        assert_eq!(ui_step_for_stage("stage99_shadow"), None);
        assert_eq!(ui_step_for_stage(""), None);
    }

    #[test]
    fn every_step_index_has_a_title() {
        let titles = ui_step_titles();
        for entry in &STAGE_TABLE {
            let idx = usize::from(entry.step.index) - 1;
            assert_eq!(titles[idx], entry.step.title);
        }
    }
}
