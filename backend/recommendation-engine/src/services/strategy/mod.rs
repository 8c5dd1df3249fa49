// ============================================
// Strategy Policy (推薦策略)
// ============================================
//
// Maps a strategy name to tier quotas and to a source weight bias:
//   aggressive   → 5 / 3 / 1, content-based weight boosted
//   balanced     → 3 / 3 / 3, weights unchanged
//   conservative → 1 / 3 / 5, score-prediction weight boosted

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::config::{SourceWeights, StrategyQuotas, TierQuota};
use crate::error::RecommendError;
use crate::models::SignalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Aggressive,
    #[default]
    Balanced,
    Conservative,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Aggressive => "aggressive",
            Strategy::Balanced => "balanced",
            Strategy::Conservative => "conservative",
        }
    }

    /// Source whose weight this strategy boosts
    pub fn favoured_source(&self) -> Option<SignalSource> {
        match self {
            Strategy::Aggressive => Some(SignalSource::ContentBased),
            Strategy::Balanced => None,
            Strategy::Conservative => Some(SignalSource::ScorePrediction),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Ok(Strategy::Aggressive),
            "balanced" => Ok(Strategy::Balanced),
            "conservative" => Ok(Strategy::Conservative),
            other => Err(RecommendError::ConfigError(format!(
                "unknown strategy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyPolicy {
    quotas: StrategyQuotas,
    weights: SourceWeights,
}

impl StrategyPolicy {
    pub fn new(quotas: StrategyQuotas, weights: SourceWeights) -> Self {
        Self { quotas, weights }
    }

    /// Parse a strategy name, falling back to balanced on anything unknown
    pub fn resolve(&self, name: &str) -> Strategy {
        match name.parse() {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!(error = %e, fallback = "balanced", "Falling back to default strategy");
                Strategy::Balanced
            }
        }
    }

    /// Preset quotas for a strategy
    pub fn quotas(&self, strategy: Strategy) -> TierQuota {
        match strategy {
            Strategy::Aggressive => self.quotas.aggressive,
            Strategy::Balanced => self.quotas.balanced,
            Strategy::Conservative => self.quotas.conservative,
        }
    }

    /// Preset quotas rescaled so they sum to `n`
    pub fn quotas_for(&self, strategy: Strategy, n: usize) -> TierQuota {
        rescale(self.quotas(strategy), n)
    }

    /// Source weights with the strategy's bias applied
    pub fn weights(&self, strategy: Strategy) -> SourceWeights {
        let mut weights = self.weights;
        if let Some(source) = strategy.favoured_source() {
            weights.set(source, weights.get(source) * self.quotas.bias_multiplier);
        }
        weights
    }
}

/// Proportional rescale: each tier gets `max(1, round(q * n / total))`,
/// then the rounding residue is absorbed by match, safety and challenge in
/// that order without going below zero.
pub fn rescale(preset: TierQuota, n: usize) -> TierQuota {
    let total = preset.total();
    if n == total {
        return preset;
    }
    if n == 0 || total == 0 {
        return TierQuota::new(0, 0, 0);
    }

    let scale = |q: usize| ((q * n) as f64 / total as f64).round().max(1.0) as usize;
    let mut quota = TierQuota::new(
        scale(preset.challenge),
        scale(preset.matched),
        scale(preset.safety),
    );

    let assigned = quota.total();
    if assigned < n {
        quota.matched += n - assigned;
    } else {
        let mut excess = assigned - n;
        for slot in [&mut quota.matched, &mut quota.safety, &mut quota.challenge] {
            let taken = excess.min(*slot);
            *slot -= taken;
            excess -= taken;
        }
    }

    quota
}
