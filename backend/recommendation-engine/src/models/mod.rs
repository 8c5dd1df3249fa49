use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{RecommendError, Result};

/// Learner risk appetite, also used as the default strategy name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskPreference {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl RiskPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskPreference::Conservative => "conservative",
            RiskPreference::Balanced => "balanced",
            RiskPreference::Aggressive => "aggressive",
        }
    }
}

/// Learner profile supplied per request (not owned by the engine)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LearnerProfile {
    pub id: String,
    pub total_score: f64,
    /// Named subject scores: math, english, specialized, ...
    #[serde(default)]
    pub subject_scores: HashMap<String, f64>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub risk_preference: RiskPreference,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub career_goal: Option<String>,
    /// Externally computed embedding of the interests text
    #[serde(default)]
    pub interest_embedding: Option<Vec<f64>>,
    /// Externally computed embedding of the career goal text
    #[serde(default)]
    pub career_embedding: Option<Vec<f64>>,
    /// Externally computed interest/description text similarity by candidate id
    #[serde(default)]
    pub interest_similarity: HashMap<String, f64>,
}

impl LearnerProfile {
    pub fn subject_score(&self, subject: &str) -> f64 {
        self.subject_scores.get(subject).copied().unwrap_or(0.0)
    }

    /// Reject malformed profiles before any scoring happens
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RecommendError::InputError(
                "learner id must not be empty".to_string(),
            ));
        }

        if !self.total_score.is_finite() || self.total_score < 0.0 {
            return Err(RecommendError::InputError(format!(
                "learner {} has invalid total score {}",
                self.id, self.total_score
            )));
        }

        if let Some((subject, score)) = self
            .subject_scores
            .iter()
            .find(|(_, score)| !score.is_finite() || **score < 0.0)
        {
            return Err(RecommendError::InputError(format!(
                "learner {} has invalid {} score {}",
                self.id, subject, score
            )));
        }

        for (name, embedding) in [
            ("interest", &self.interest_embedding),
            ("career", &self.career_embedding),
        ] {
            if let Some(values) = embedding {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(RecommendError::InputError(format!(
                        "learner {} has a non-finite {} embedding",
                        self.id, name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A recommendable institution, optionally paired with a program
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    /// Historical minimum admission score
    #[serde(default)]
    pub admission_line: Option<f64>,
    #[serde(default)]
    pub admission_rate: Option<f64>,
    /// Institution type, e.g. 综合 / 理工 / 医药 / 财经 / 师范 / 政法 / 艺术
    #[serde(default)]
    pub school_type: String,
    #[serde(default)]
    pub province: Option<String>,
    /// Descriptive strengths used for interest matching
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub subject_strengths: Option<Vec<f64>>,
}

impl Candidate {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RecommendError::InputError(
                "candidate id must not be empty".to_string(),
            ));
        }

        if let Some(line) = self.admission_line {
            if !line.is_finite() || line < 0.0 {
                return Err(RecommendError::InputError(format!(
                    "candidate {} has invalid admission line {}",
                    self.id, line
                )));
            }
        }

        if let Some(rate) = self.admission_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(RecommendError::InputError(format!(
                    "candidate {} has admission rate {} outside [0, 1]",
                    self.id, rate
                )));
            }
        }

        Ok(())
    }
}

/// Kind of learner feedback on a candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Click,
    Favorite,
    Apply,
    Ignore,
}

impl InteractionType {
    /// Implicit rating used when the caller does not supply one
    pub fn default_rating(&self) -> f64 {
        match self {
            InteractionType::Click => 0.5,
            InteractionType::Favorite | InteractionType::Apply => 1.0,
            InteractionType::Ignore => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Click => "click",
            InteractionType::Favorite => "favorite",
            InteractionType::Apply => "apply",
            InteractionType::Ignore => "ignore",
        }
    }
}

impl std::str::FromStr for InteractionType {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "click" => Ok(InteractionType::Click),
            "favorite" => Ok(InteractionType::Favorite),
            "apply" => Ok(InteractionType::Apply),
            "ignore" => Ok(InteractionType::Ignore),
            other => Err(RecommendError::InputError(format!(
                "unknown interaction type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionRecord {
    pub learner_id: String,
    pub candidate_id: String,
    pub rating: f64,
    pub interaction_type: InteractionType,
    pub recorded_at: DateTime<Utc>,
}

impl InteractionRecord {
    /// Build a record, using the interaction's default rating unless one is given
    pub fn new(
        learner_id: impl Into<String>,
        candidate_id: impl Into<String>,
        interaction_type: InteractionType,
        rating: Option<f64>,
    ) -> Self {
        let rating = rating
            .filter(|r| r.is_finite())
            .unwrap_or_else(|| interaction_type.default_rating())
            .clamp(0.0, 1.0);

        Self {
            learner_id: learner_id.into(),
            candidate_id: candidate_id.into(),
            rating,
            interaction_type,
            recorded_at: Utc::now(),
        }
    }
}

/// Independent scorer feeding the aggregator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Advisory,
    CollaborativeFiltering,
    ContentBased,
    ScorePrediction,
}

impl SignalSource {
    pub const ALL: [SignalSource; 4] = [
        SignalSource::Advisory,
        SignalSource::CollaborativeFiltering,
        SignalSource::ContentBased,
        SignalSource::ScorePrediction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Advisory => "advisory",
            SignalSource::CollaborativeFiltering => "collaborative_filtering",
            SignalSource::ContentBased => "content_based",
            SignalSource::ScorePrediction => "score_prediction",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission difficulty bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Challenge,
    Match,
    Safety,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Challenge => "challenge",
            Tier::Match => "match",
            Tier::Safety => "safety",
        }
    }
}

/// One source's opinion about one candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalScore {
    pub candidate_id: String,
    pub source: SignalSource,
    /// Always within [0, 1]
    pub score: f64,
    /// Statistically grounded tier (score prediction only)
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub admission_probability: Option<f64>,
}

impl SignalScore {
    pub fn new(candidate_id: impl Into<String>, source: SignalSource, score: f64) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            source,
            score: clamp_unit(score),
            tier: None,
            admission_probability: None,
        }
    }

    pub fn with_admission(mut self, probability: f64, tier: Tier) -> Self {
        self.admission_probability = Some(clamp_unit(probability));
        self.tier = Some(tier);
        self
    }
}

/// Clamp into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Merged, tiered view of one candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositeResult {
    pub candidate_id: String,
    pub name: String,
    pub composite_score: f64,
    pub admission_probability: f64,
    pub tier: Tier,
    /// Raw per-source scores kept for explainability
    pub source_scores: BTreeMap<SignalSource, f64>,
    pub preference_boost: f64,
    /// Tier attached by a statistical source, if any
    #[serde(default)]
    pub statistical_tier: Option<Tier>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TieredRecommendations {
    pub strategy: String,
    pub challenge: Vec<CompositeResult>,
    #[serde(rename = "match")]
    pub matched: Vec<CompositeResult>,
    pub safety: Vec<CompositeResult>,
    pub max_achievable: f64,
    /// Sources that contributed nothing to this request
    pub unavailable_sources: Vec<SignalSource>,
}

impl TieredRecommendations {
    pub fn empty(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            ..Default::default()
        }
    }

    pub fn total(&self) -> usize {
        self.challenge.len() + self.matched.len() + self.safety.len()
    }

    pub fn tier(&self, tier: Tier) -> &[CompositeResult] {
        match tier {
            Tier::Challenge => &self.challenge,
            Tier::Match => &self.matched,
            Tier::Safety => &self.safety,
        }
    }
}
