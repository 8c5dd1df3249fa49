use serde::{Deserialize, Serialize};

use crate::error::{RecommendError, Result};
use crate::models::SignalSource;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub service: ServiceConfig,
    pub weights: SourceWeights,
    pub strategies: StrategyQuotas,
    pub cf: CfConfig,
    pub signals: SignalConfig,
    pub profile: ProfileConfig,
    pub retrain: RetrainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    /// JSON file with interaction records used for the initial fit
    #[serde(default)]
    pub interactions_path: Option<String>,
    /// Where the trained CF model snapshot is written after each fit
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "recommendation-engine".to_string(),
            interactions_path: None,
            snapshot_path: None,
        }
    }
}

/// Per-source weight table used by the aggregator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SourceWeights {
    pub advisory: f64,
    pub collaborative_filtering: f64,
    pub content_based: f64,
    pub score_prediction: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            advisory: 0.4,
            collaborative_filtering: 0.2,
            content_based: 0.2,
            score_prediction: 0.2,
        }
    }
}

impl SourceWeights {
    pub fn get(&self, source: SignalSource) -> f64 {
        match source {
            SignalSource::Advisory => self.advisory,
            SignalSource::CollaborativeFiltering => self.collaborative_filtering,
            SignalSource::ContentBased => self.content_based,
            SignalSource::ScorePrediction => self.score_prediction,
        }
    }

    pub fn set(&mut self, source: SignalSource, weight: f64) {
        match source {
            SignalSource::Advisory => self.advisory = weight,
            SignalSource::CollaborativeFiltering => self.collaborative_filtering = weight,
            SignalSource::ContentBased => self.content_based = weight,
            SignalSource::ScorePrediction => self.score_prediction = weight,
        }
    }

    /// Maximum composite score achievable under full source weighting
    pub fn total(&self) -> f64 {
        SignalSource::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// Challenge / match / safety counts for one strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierQuota {
    pub challenge: usize,
    #[serde(rename = "match")]
    pub matched: usize,
    pub safety: usize,
}

impl TierQuota {
    pub const fn new(challenge: usize, matched: usize, safety: usize) -> Self {
        Self {
            challenge,
            matched,
            safety,
        }
    }

    pub fn total(&self) -> usize {
        self.challenge + self.matched + self.safety
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct StrategyQuotas {
    pub aggressive: TierQuota,
    pub balanced: TierQuota,
    pub conservative: TierQuota,
    /// Multiplier applied to the favoured source of a biased strategy
    pub bias_multiplier: f64,
}

impl Default for StrategyQuotas {
    fn default() -> Self {
        Self {
            aggressive: TierQuota::new(5, 3, 1),
            balanced: TierQuota::new(3, 3, 3),
            conservative: TierQuota::new(1, 3, 5),
            bias_multiplier: 1.4,
        }
    }
}

/// Collaborative filtering hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CfConfig {
    /// Latent factor dimension (k)
    pub factors: usize,
    /// Neighbours kept per candidate in the KNN index
    pub neighbors: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// L2 penalty on factors and biases
    pub regularization: f64,
    /// 0 = pure neighbourhood, 1 = pure latent factor
    pub blend_ratio: f64,
    pub seed: u64,
}

impl Default for CfConfig {
    fn default() -> Self {
        Self {
            factors: 50,
            neighbors: 20,
            epochs: 20,
            batch_size: 64,
            learning_rate: 0.01,
            regularization: 0.01,
            blend_ratio: 0.5,
            seed: 42,
        }
    }
}

/// Which scorer fills the content-based source
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentScorerKind {
    /// Keyword, region and career rules
    #[default]
    Keyword,
    /// Feature match over the vectorized profile
    ProfileModel,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SignalConfig {
    pub source_timeout_ms: u64,
    pub max_concurrent_sources: usize,
    /// Bonus per matched preferred province / preferred type
    pub preference_boost: f64,
    #[serde(default)]
    pub content_scorer: ContentScorerKind,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: 2000,
            max_concurrent_sources: 4,
            preference_boost: 0.1,
            content_scorer: ContentScorerKind::Keyword,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProfileConfig {
    /// Length of the interest and career embedding slots
    pub embedding_dim: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { embedding_dim: 768 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetrainConfig {
    pub interval_secs: u64,
    pub run_once: bool,
    /// Skip a pass when fewer interactions are stored
    pub min_interactions: usize,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            run_once: false,
            min_interactions: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> std::result::Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let weights = SourceWeights::default();
        let quotas = StrategyQuotas::default();
        let cf = CfConfig::default();
        let signals = SignalConfig::default();

        let config = config::Config::builder()
            .set_default("service.service_name", "recommendation-engine")?
            .set_default("weights.advisory", weights.advisory)?
            .set_default("weights.collaborative_filtering", weights.collaborative_filtering)?
            .set_default("weights.content_based", weights.content_based)?
            .set_default("weights.score_prediction", weights.score_prediction)?
            .set_default("strategies.aggressive.challenge", quotas.aggressive.challenge as i64)?
            .set_default("strategies.aggressive.match", quotas.aggressive.matched as i64)?
            .set_default("strategies.aggressive.safety", quotas.aggressive.safety as i64)?
            .set_default("strategies.balanced.challenge", quotas.balanced.challenge as i64)?
            .set_default("strategies.balanced.match", quotas.balanced.matched as i64)?
            .set_default("strategies.balanced.safety", quotas.balanced.safety as i64)?
            .set_default("strategies.conservative.challenge", quotas.conservative.challenge as i64)?
            .set_default("strategies.conservative.match", quotas.conservative.matched as i64)?
            .set_default("strategies.conservative.safety", quotas.conservative.safety as i64)?
            .set_default("strategies.bias_multiplier", quotas.bias_multiplier)?
            .set_default("cf.factors", cf.factors as i64)?
            .set_default("cf.neighbors", cf.neighbors as i64)?
            .set_default("cf.epochs", cf.epochs as i64)?
            .set_default("cf.batch_size", cf.batch_size as i64)?
            .set_default("cf.learning_rate", cf.learning_rate)?
            .set_default("cf.regularization", cf.regularization)?
            .set_default("cf.blend_ratio", cf.blend_ratio)?
            .set_default("cf.seed", cf.seed as i64)?
            .set_default("signals.source_timeout_ms", signals.source_timeout_ms as i64)?
            .set_default("signals.max_concurrent_sources", signals.max_concurrent_sources as i64)?
            .set_default("signals.preference_boost", signals.preference_boost)?
            .set_default("signals.content_scorer", "keyword")?
            .set_default("profile.embedding_dim", 768)?
            .set_default("retrain.interval_secs", 3600)? // 1 hour
            .set_default("retrain.run_once", false)?
            .set_default("retrain.min_interactions", 10)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        for source in SignalSource::ALL {
            let weight = self.weights.get(source);
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecommendError::ConfigError(format!(
                    "weight for {} must be a non-negative number, got {}",
                    source, weight
                )));
            }
        }

        if self.weights.total() <= 0.0 {
            return Err(RecommendError::ConfigError(
                "at least one source weight must be positive".to_string(),
            ));
        }

        if self.strategies.bias_multiplier < 1.0 {
            return Err(RecommendError::ConfigError(
                "strategy bias multiplier must be at least 1.0".to_string(),
            ));
        }

        for (name, quota) in [
            ("aggressive", self.strategies.aggressive),
            ("balanced", self.strategies.balanced),
            ("conservative", self.strategies.conservative),
        ] {
            if quota.total() == 0 {
                return Err(RecommendError::ConfigError(format!(
                    "strategy {} must request at least one result",
                    name
                )));
            }
        }

        if self.cf.factors == 0 || self.cf.batch_size == 0 || self.cf.epochs == 0 {
            return Err(RecommendError::ConfigError(
                "cf factors, batch size and epochs must be greater than 0".to_string(),
            ));
        }

        if !(self.cf.learning_rate > 0.0 && self.cf.learning_rate <= 1.0) {
            return Err(RecommendError::ConfigError(
                "cf learning rate must be in (0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.cf.blend_ratio) {
            return Err(RecommendError::ConfigError(
                "cf blend ratio must be between 0 and 1".to_string(),
            ));
        }

        if self.signals.source_timeout_ms == 0 || self.signals.max_concurrent_sources == 0 {
            return Err(RecommendError::ConfigError(
                "source timeout and concurrency limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!((config.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights() {
        let mut config = Config::default();
        config.weights.advisory = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.weights = SourceWeights {
            advisory: 0.0,
            collaborative_filtering: 0.0,
            content_based: 0.0,
            score_prediction: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_blend_ratio() {
        let mut config = Config::default();
        config.cf.blend_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_content_scorer_names() {
        let kind: ContentScorerKind = serde_json::from_str("\"profile_model\"").unwrap();
        assert_eq!(kind, ContentScorerKind::ProfileModel);
        assert_eq!(SignalConfig::default().content_scorer, ContentScorerKind::Keyword);
    }

    #[test]
    fn test_weight_lookup_round_trips_every_source() {
        let mut weights = SourceWeights::default();
        for (i, source) in SignalSource::ALL.iter().enumerate() {
            weights.set(*source, i as f64);
        }
        for (i, source) in SignalSource::ALL.iter().enumerate() {
            assert_eq!(weights.get(*source), i as f64);
        }
    }
}
