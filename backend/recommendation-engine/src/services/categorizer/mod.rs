// ============================================
// Categorizer (冲刺 / 稳妥 / 保底 分層)
// ============================================
//
// Partitions composite results into challenge / match / safety tiers,
// ranks each tier, fills per-tier quotas and backfills shortfalls from
// surplus in the order match → safety → challenge.

use std::cmp::Ordering;
use tracing::debug;

use crate::config::TierQuota;
use crate::models::{CompositeResult, Tier, TieredRecommendations};
use crate::services::strategy::Strategy;
use crate::utils::desc_by_score;

const SAFETY_SHARE: f64 = 0.8;
const MATCH_SHARE: f64 = 0.4;

/// Order in which surplus candidates fill other tiers' shortfall
const BACKFILL_ORDER: [Tier; 3] = [Tier::Match, Tier::Safety, Tier::Challenge];

/// Statistical tier when a source provided one, else derived from the
/// composite as a share of the maximum achievable score
pub fn assign_tier(composite: f64, max_achievable: f64, statistical: Option<Tier>) -> Tier {
    if let Some(tier) = statistical {
        return tier;
    }

    if composite >= SAFETY_SHARE * max_achievable {
        Tier::Safety
    } else if composite >= MATCH_SHARE * max_achievable {
        Tier::Match
    } else {
        Tier::Challenge
    }
}

fn by_composite(a: &CompositeResult, b: &CompositeResult) -> Ordering {
    desc_by_score(a.composite_score, b.composite_score)
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

fn quota_of(quota: &TierQuota, tier: Tier) -> usize {
    match tier {
        Tier::Challenge => quota.challenge,
        Tier::Match => quota.matched,
        Tier::Safety => quota.safety,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Categorizer;

impl Categorizer {
    pub fn new() -> Self {
        Self
    }

    /// Tier, rank and cut results down to the quota.
    ///
    /// The total never exceeds `quota.total()`, and equals it whenever there
    /// are at least that many results.
    pub fn categorize(
        &self,
        results: Vec<CompositeResult>,
        quota: TierQuota,
        max_achievable: f64,
        strategy: Strategy,
    ) -> TieredRecommendations {
        let mut output = TieredRecommendations::empty(strategy.as_str());
        output.max_achievable = max_achievable;

        for mut result in results {
            result.tier = assign_tier(result.composite_score, max_achievable, result.statistical_tier);
            match result.tier {
                Tier::Challenge => output.challenge.push(result),
                Tier::Match => output.matched.push(result),
                Tier::Safety => output.safety.push(result),
            }
        }

        output.challenge.sort_by(by_composite);
        output.matched.sort_by(by_composite);
        output.safety.sort_by(by_composite);

        let available = |tier: Tier, out: &TieredRecommendations| out.tier(tier).len();

        let mut take = [Tier::Challenge, Tier::Match, Tier::Safety]
            .map(|tier| quota_of(&quota, tier).min(available(tier, &output)));
        let mut shortfall = quota.total() - take.iter().sum::<usize>();

        for tier in BACKFILL_ORDER {
            if shortfall == 0 {
                break;
            }
            let slot = &mut take[tier_slot(tier)];
            let extra = shortfall.min(available(tier, &output) - *slot);
            *slot += extra;
            shortfall -= extra;
        }

        output.challenge.truncate(take[tier_slot(Tier::Challenge)]);
        output.matched.truncate(take[tier_slot(Tier::Match)]);
        output.safety.truncate(take[tier_slot(Tier::Safety)]);

        debug!(
            challenge = output.challenge.len(),
            matched = output.matched.len(),
            safety = output.safety.len(),
            unfilled = shortfall,
            "Candidates categorized"
        );

        output
    }
}

fn tier_slot(tier: Tier) -> usize {
    match tier {
        Tier::Challenge => 0,
        Tier::Match => 1,
        Tier::Safety => 2,
    }
}
