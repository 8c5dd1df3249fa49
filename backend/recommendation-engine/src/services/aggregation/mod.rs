// ============================================
// Signal Aggregator (多源信號融合)
// ============================================
//
// Merges per-source scores into one composite per candidate:
//
//   composite = Σ weight(source) * score(source) + preference boost
//
// capped at the maximum achievable score (sum of all weights). A source
// without a score for a candidate contributes 0.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::config::SourceWeights;
use crate::models::{clamp_unit, Candidate, CompositeResult, SignalScore, SignalSource};
use crate::services::categorizer::assign_tier;

/// Learner-stated preferences that earn a flat bonus
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    pub provinces: Vec<String>,
    pub school_types: Vec<String>,
}

impl Preferences {
    pub fn new(provinces: Vec<String>, school_types: Vec<String>) -> Self {
        Self {
            provinces,
            school_types,
        }
    }

    /// Number of preferences the candidate satisfies (0, 1 or 2)
    fn matches(&self, candidate: &Candidate) -> usize {
        let province = candidate
            .province
            .as_ref()
            .map_or(false, |p| self.provinces.iter().any(|pref| pref == p));
        let school_type = self
            .school_types
            .iter()
            .any(|pref| *pref == candidate.school_type);
        province as usize + school_type as usize
    }
}

#[derive(Debug, Clone)]
pub struct SignalAggregator {
    preference_boost: f64,
}

impl SignalAggregator {
    pub fn new(preference_boost: f64) -> Self {
        Self { preference_boost }
    }

    /// One composite per distinct pool candidate, in pool order
    pub fn aggregate(
        &self,
        pool: &[Candidate],
        signals: &[SignalScore],
        weights: &SourceWeights,
        preferences: &Preferences,
    ) -> Vec<CompositeResult> {
        let max_achievable = weights.total();

        // Dedup pool by id, first occurrence wins
        let mut seen = HashSet::new();
        let candidates: Vec<&Candidate> = pool.iter().filter(|c| seen.insert(c.id.as_str())).collect();
        if candidates.len() < pool.len() {
            debug!(
                duplicates = pool.len() - candidates.len(),
                "Dropped duplicate candidates from pool"
            );
        }

        // Best score per (candidate, source)
        let mut by_candidate: HashMap<&str, BTreeMap<SignalSource, &SignalScore>> = HashMap::new();
        let mut dropped = 0usize;
        for signal in signals {
            if !seen.contains(signal.candidate_id.as_str()) {
                dropped += 1;
                continue;
            }
            by_candidate
                .entry(signal.candidate_id.as_str())
                .or_default()
                .entry(signal.source)
                .and_modify(|best| {
                    if signal.score > best.score {
                        *best = signal;
                    }
                })
                .or_insert(signal);
        }
        if dropped > 0 {
            debug!(dropped = dropped, "Dropped scores for candidates outside the pool");
        }

        candidates
            .into_iter()
            .map(|candidate| {
                let scores = by_candidate.remove(candidate.id.as_str()).unwrap_or_default();
                self.compose(candidate, scores, weights, max_achievable, preferences)
            })
            .collect()
    }

    fn compose(
        &self,
        candidate: &Candidate,
        scores: BTreeMap<SignalSource, &SignalScore>,
        weights: &SourceWeights,
        max_achievable: f64,
        preferences: &Preferences,
    ) -> CompositeResult {
        let weighted: f64 = scores
            .iter()
            .map(|(source, signal)| clamp_unit(signal.score) * weights.get(*source))
            .sum();

        let boost = self.preference_boost * preferences.matches(candidate) as f64;
        let composite = (weighted + boost).min(max_achievable).max(0.0);
        let applied_boost = (composite - weighted).max(0.0);

        let prediction = scores.get(&SignalSource::ScorePrediction);
        let statistical_tier = prediction.and_then(|s| s.tier);
        let admission_probability = match prediction.and_then(|s| s.admission_probability) {
            Some(p) => p,
            None if max_achievable > 0.0 => clamp_unit(composite / max_achievable),
            None => 0.0,
        };

        CompositeResult {
            candidate_id: candidate.id.clone(),
            name: candidate.name.clone(),
            composite_score: composite,
            admission_probability,
            tier: assign_tier(composite, max_achievable, statistical_tier),
            source_scores: scores
                .into_iter()
                .map(|(source, signal)| (source, signal.score))
                .collect(),
            preference_boost: applied_boost,
            statistical_tier,
        }
    }
}
