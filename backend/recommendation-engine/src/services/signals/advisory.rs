use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

use super::{SignalOutcome, SignalProvider, SignalRequest};
use crate::models::{SignalScore, SignalSource};

/// Passes externally supplied advisory scores into the pipeline.
///
/// Scores are re-tagged with the advisory source and clamped; ids outside
/// the candidate pool are left for the aggregator to drop.
#[derive(Debug, Default)]
pub struct AdvisorySignal;

impl AdvisorySignal {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignalProvider for AdvisorySignal {
    async fn score(&self, request: &SignalRequest) -> SignalOutcome {
        if request.advisory.is_empty() {
            return SignalOutcome::Empty("no advisory scores supplied".to_string());
        }

        let pool: HashSet<&str> = request.candidates.iter().map(|c| c.id.as_str()).collect();
        let outside = request
            .advisory
            .iter()
            .filter(|s| !pool.contains(s.candidate_id.as_str()))
            .count();
        if outside > 0 {
            debug!(outside = outside, "Advisory scores reference candidates outside the pool");
        }

        let scores = request
            .advisory
            .iter()
            .map(|s| SignalScore::new(s.candidate_id.clone(), SignalSource::Advisory, s.score))
            .collect();

        SignalOutcome::Scores(scores)
    }

    fn source(&self) -> SignalSource {
        SignalSource::Advisory
    }
}
