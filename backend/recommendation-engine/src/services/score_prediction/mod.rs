// ============================================
// Score Prediction Scorer (分數預測)
// ============================================
//
// Estimates admission probability from the gap between the learner's total
// score and the candidate's historical admission line, then buckets it into
// a statistically grounded tier.

use async_trait::async_trait;

use crate::models::{Candidate, LearnerProfile, SignalScore, SignalSource, Tier};
use crate::services::signals::{SignalOutcome, SignalProvider, SignalRequest};

/// (minimum score gap, probability), checked top to bottom
const PROBABILITY_STEPS: [(f64, f64); 7] = [
    (30.0, 0.95),
    (20.0, 0.90),
    (10.0, 0.80),
    (0.0, 0.70),
    (-10.0, 0.50),
    (-20.0, 0.30),
    (-30.0, 0.20),
];
const FLOOR_PROBABILITY: f64 = 0.10;
const UNKNOWN_LINE_PROBABILITY: f64 = 0.5;

const SAFETY_THRESHOLD: f64 = 0.8;
const MATCH_THRESHOLD: f64 = 0.4;

/// Admission estimate for one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionEstimate {
    pub probability: f64,
    pub tier: Tier,
    /// Learner total minus admission line, when the line is known
    pub score_gap: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScorePredictionScorer;

impl ScorePredictionScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, learner: &LearnerProfile, candidate: &Candidate) -> AdmissionEstimate {
        let Some(line) = candidate.admission_line else {
            return AdmissionEstimate {
                probability: UNKNOWN_LINE_PROBABILITY,
                tier: Tier::Match,
                score_gap: None,
            };
        };

        let gap = learner.total_score - line;
        let probability = probability_for_gap(gap);

        AdmissionEstimate {
            probability,
            tier: tier_for_probability(probability),
            score_gap: Some(gap),
        }
    }
}

pub fn probability_for_gap(gap: f64) -> f64 {
    PROBABILITY_STEPS
        .iter()
        .find(|(min_gap, _)| gap >= *min_gap)
        .map_or(FLOOR_PROBABILITY, |(_, p)| *p)
}

pub fn tier_for_probability(probability: f64) -> Tier {
    if probability >= SAFETY_THRESHOLD {
        Tier::Safety
    } else if probability >= MATCH_THRESHOLD {
        Tier::Match
    } else {
        Tier::Challenge
    }
}

#[async_trait]
impl SignalProvider for ScorePredictionScorer {
    async fn score(&self, request: &SignalRequest) -> SignalOutcome {
        if request.candidates.is_empty() {
            return SignalOutcome::Empty("empty candidate pool".to_string());
        }

        let scores = request
            .candidates
            .iter()
            .map(|candidate| {
                let estimate = self.estimate(&request.learner, candidate);
                SignalScore::new(
                    candidate.id.clone(),
                    SignalSource::ScorePrediction,
                    estimate.probability,
                )
                .with_admission(estimate.probability, estimate.tier)
            })
            .collect();

        SignalOutcome::Scores(scores)
    }

    fn source(&self) -> SignalSource {
        SignalSource::ScorePrediction
    }
}
