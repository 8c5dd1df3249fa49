// ============================================
// Profile Model Scorer (畫像特徵匹配)
// ============================================
//
// Model-based alternative to the keyword rules for the content-based
// source. Each candidate becomes a feature vector (admission rate,
// prestige, province one-hot, subject strengths) that is matched block by
// block against the learner's profile vector:
//
//   subject fit   0.35  cosine(learner subject scores, subject strengths)
//   province fit  0.25  same province slot
//   risk fit      0.25  risk preference vs admission rate
//   prestige      0.15  1 / sqrt(rank)

use async_trait::async_trait;
use ndarray::{s, Array1, ArrayView1};

use crate::error::RecommendError;
use crate::models::{clamp_unit, Candidate, SignalScore, SignalSource};
use crate::services::profile::{VectorLayout, PROVINCES, SUBJECTS};
use crate::services::signals::{SignalOutcome, SignalProvider, SignalRequest};

const SUBJECT_WEIGHT: f64 = 0.35;
const PROVINCE_WEIGHT: f64 = 0.25;
const RISK_WEIGHT: f64 = 0.25;
const PRESTIGE_WEIGHT: f64 = 0.15;

const NEUTRAL: f64 = 0.5;

/// Candidate side of the match
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFeatures {
    pub admission_rate: f64,
    pub prestige: f64,
    /// One slot per entry of `PROVINCES`
    pub provinces: Array1<f64>,
    /// Aligned with `SUBJECTS`; missing trailing values count as 0.0
    pub subject_strengths: Option<Array1<f64>>,
}

impl CandidateFeatures {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let province = candidate.province.as_deref().unwrap_or("");
        let provinces = PROVINCES
            .iter()
            .map(|p| if *p == province { 1.0 } else { 0.0 })
            .collect();

        let subject_strengths = candidate
            .subject_strengths
            .as_ref()
            .filter(|strengths| !strengths.is_empty())
            .map(|strengths| {
                (0..SUBJECTS.len())
                    .map(|i| strengths.get(i).copied().unwrap_or(0.0))
                    .collect()
            });

        Self {
            admission_rate: candidate.admission_rate.map_or(NEUTRAL, clamp_unit),
            prestige: candidate
                .rank
                .map_or(NEUTRAL, |rank| 1.0 / f64::from(rank.max(1)).sqrt()),
            provinces,
            subject_strengths,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileModelScorer {
    layout: VectorLayout,
}

impl ProfileModelScorer {
    /// `embedding_dim` must match the vectorizer that produces the profiles
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            layout: VectorLayout::new(embedding_dim),
        }
    }

    pub fn match_score(&self, profile: ArrayView1<f64>, features: &CandidateFeatures) -> f64 {
        let subjects = self.layout.subjects();
        let subject_fit = match &features.subject_strengths {
            Some(strengths) => {
                let learner = profile.slice(s![subjects.start..subjects.end]);
                let norm = learner.dot(&learner).sqrt() * strengths.dot(strengths).sqrt();
                if norm <= f64::EPSILON {
                    NEUTRAL
                } else {
                    NEUTRAL + 0.5 * (learner.dot(strengths) / norm)
                }
            }
            None => NEUTRAL,
        };

        let provinces = self.layout.provinces.start;
        let same_province = profile
            .slice(s![provinces..provinces + PROVINCES.len()])
            .dot(&features.provinces);
        let province_fit = NEUTRAL + 0.5 * same_province.min(1.0);

        // conservative wants a high admission rate, aggressive a selective school
        let rate = features.admission_rate;
        let appetite = Array1::from(vec![rate, 1.0 - (rate - 0.5).abs(), 1.0 - rate]);
        let risk_fit = profile
            .slice(s![self.layout.risk.start..self.layout.risk.end])
            .dot(&appetite);

        clamp_unit(
            SUBJECT_WEIGHT * subject_fit
                + PROVINCE_WEIGHT * province_fit
                + RISK_WEIGHT * risk_fit
                + PRESTIGE_WEIGHT * features.prestige,
        )
    }
}

#[async_trait]
impl SignalProvider for ProfileModelScorer {
    async fn score(&self, request: &SignalRequest) -> SignalOutcome {
        if request.candidates.is_empty() {
            return SignalOutcome::Empty("empty candidate pool".to_string());
        }

        let Some(profile) = &request.profile_vector else {
            return SignalOutcome::Unavailable(RecommendError::SourceUnavailable {
                signal: SignalSource::ContentBased,
                reason: "no profile vector on the request".to_string(),
            });
        };
        if profile.len() != self.layout.dimension() {
            return SignalOutcome::Unavailable(RecommendError::SourceUnavailable {
                signal: SignalSource::ContentBased,
                reason: format!(
                    "profile vector has length {}, expected {}",
                    profile.len(),
                    self.layout.dimension()
                ),
            });
        }

        let scores = request
            .candidates
            .iter()
            .map(|candidate| {
                let features = CandidateFeatures::from_candidate(candidate);
                SignalScore::new(
                    candidate.id.clone(),
                    SignalSource::ContentBased,
                    self.match_score(profile.view(), &features),
                )
            })
            .collect();

        SignalOutcome::Scores(scores)
    }

    fn source(&self) -> SignalSource {
        SignalSource::ContentBased
    }
}
