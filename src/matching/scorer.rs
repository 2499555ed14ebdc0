//! Candidate scoring for the matching queue
//!
//! Scores are purely additive. The jitter term is drawn once per candidate
//! by the caller and passed in, so a ranking never resamples it.

use crate::config::MatchingSettings;
use crate::types::{LanguagePriority, UserId};
use crate::utils::RandomSource;
use serde::Serialize;
use std::collections::HashSet;

/// What the scorer needs to know about the searching user
#[derive(Debug, Clone)]
pub struct RequesterProfile {
    pub user_id: UserId,
    pub languages: HashSet<String>,
    pub language_priority: LanguagePriority,
}

/// What the scorer needs to know about a queued candidate
#[derive(Debug, Clone)]
pub struct CandidateProfile {
    pub user_id: UserId,
    pub languages: HashSet<String>,
    pub is_verified: bool,
    pub care_score: u32,
    pub reliability_score: Option<u32>,
}

/// Per-term breakdown of a compatibility score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub language: u32,
    pub verification: u32,
    pub care: u32,
    pub reliability: u32,
    pub jitter: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.language + self.verification + self.care + self.reliability + self.jitter
    }
}

/// Trait for scoring a candidate against a searcher (higher = better fit)
pub trait MatchScorer: Send + Sync {
    /// Score a candidate using an already-drawn jitter value
    fn score(
        &self,
        requester: &RequesterProfile,
        candidate: &CandidateProfile,
        jitter: u32,
    ) -> ScoreBreakdown;

    /// Draw the jitter term for one candidate
    fn draw_jitter(&self, rng: &RandomSource) -> u32;
}

/// Scorer weighting languages, verification, care and reliability
#[derive(Debug, Clone, Default)]
pub struct WeightedMatchScorer {
    settings: MatchingSettings,
}

impl WeightedMatchScorer {
    pub fn new(settings: MatchingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MatchingSettings {
        &self.settings
    }

    /// Language term: shared languages under `ease`, new ones under `learning`
    fn language_score(&self, requester: &RequesterProfile, candidate: &CandidateProfile) -> u32 {
        let counted = match requester.language_priority {
            LanguagePriority::Ease => requester
                .languages
                .intersection(&candidate.languages)
                .count(),
            LanguagePriority::Learning => candidate
                .languages
                .difference(&requester.languages)
                .count(),
        };
        counted as u32 * self.settings.language_weight
    }
}

impl MatchScorer for WeightedMatchScorer {
    fn score(
        &self,
        requester: &RequesterProfile,
        candidate: &CandidateProfile,
        jitter: u32,
    ) -> ScoreBreakdown {
        let reliability = candidate
            .reliability_score
            .unwrap_or(self.settings.default_reliability);

        ScoreBreakdown {
            language: self.language_score(requester, candidate),
            verification: if candidate.is_verified {
                self.settings.verified_bonus
            } else {
                0
            },
            care: candidate.care_score / self.settings.care_divisor,
            reliability: reliability / self.settings.reliability_divisor,
            jitter,
        }
    }

    fn draw_jitter(&self, rng: &RandomSource) -> u32 {
        rng.below(self.settings.jitter_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn langs(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn requester(codes: &[&str], priority: LanguagePriority) -> RequesterProfile {
        RequesterProfile {
            user_id: "searcher".to_string(),
            languages: langs(codes),
            language_priority: priority,
        }
    }

    fn candidate(codes: &[&str]) -> CandidateProfile {
        CandidateProfile {
            user_id: "candidate".to_string(),
            languages: langs(codes),
            is_verified: false,
            care_score: 0,
            reliability_score: None,
        }
    }

    #[test]
    fn test_ease_counts_shared_languages() {
        let scorer = WeightedMatchScorer::default();
        let breakdown = scorer.score(
            &requester(&["en", "es", "fr"], LanguagePriority::Ease),
            &candidate(&["es", "fr", "de"]),
            0,
        );
        assert_eq!(breakdown.language, 40);
    }

    #[test]
    fn test_learning_counts_new_languages() {
        let scorer = WeightedMatchScorer::default();
        let breakdown = scorer.score(
            &requester(&["en", "es"], LanguagePriority::Learning),
            &candidate(&["es", "ja", "ko"]),
            0,
        );
        assert_eq!(breakdown.language, 40);
    }

    #[test]
    fn test_full_breakdown() {
        let scorer = WeightedMatchScorer::default();
        let mut cand = candidate(&["en"]);
        cand.is_verified = true;
        cand.care_score = 87;
        cand.reliability_score = Some(60);

        let breakdown = scorer.score(&requester(&["en"], LanguagePriority::Ease), &cand, 7);
        assert_eq!(breakdown.language, 20);
        assert_eq!(breakdown.verification, 30);
        assert_eq!(breakdown.care, 8);
        assert_eq!(breakdown.reliability, 3);
        assert_eq!(breakdown.jitter, 7);
        assert_eq!(breakdown.total(), 68);
    }

    #[test]
    fn test_missing_reliability_defaults_to_five_points() {
        let scorer = WeightedMatchScorer::default();
        let breakdown = scorer.score(
            &requester(&[], LanguagePriority::Ease),
            &candidate(&[]),
            0,
        );
        assert_eq!(breakdown.reliability, 5);
        assert_eq!(breakdown.total(), 5);
    }

    #[test]
    fn test_jitter_draws_stay_in_range() {
        let scorer = WeightedMatchScorer::default();
        let rng = RandomSource::seeded(99);
        for _ in 0..500 {
            assert!(scorer.draw_jitter(&rng) < 15);
        }
    }

    proptest! {
        #[test]
        fn prop_ease_monotonic_in_shared_languages(shared in 0usize..8, jitter in 0u32..15) {
            let scorer = WeightedMatchScorer::default();
            let codes: Vec<String> = (0..=shared).map(|i| format!("l{}", i)).collect();
            let req = RequesterProfile {
                user_id: "r".to_string(),
                languages: codes.iter().cloned().collect(),
                language_priority: LanguagePriority::Ease,
            };
            let mut fewer = candidate(&[]);
            fewer.languages = codes[..shared].iter().cloned().collect();
            let mut more = candidate(&[]);
            more.languages = codes[..=shared].iter().cloned().collect();

            prop_assert!(
                scorer.score(&req, &more, jitter).total() > scorer.score(&req, &fewer, jitter).total()
            );
        }

        #[test]
        fn prop_learning_monotonic_in_unique_languages(unique in 0usize..8, jitter in 0u32..15) {
            let scorer = WeightedMatchScorer::default();
            let req = requester(&["en"], LanguagePriority::Learning);
            let codes: Vec<String> = (0..=unique).map(|i| format!("x{}", i)).collect();
            let mut fewer = candidate(&["en"]);
            fewer.languages.extend(codes[..unique].iter().cloned());
            let mut more = candidate(&["en"]);
            more.languages.extend(codes[..=unique].iter().cloned());

            prop_assert!(
                scorer.score(&req, &more, jitter).total() > scorer.score(&req, &fewer, jitter).total()
            );
        }
    }
}
