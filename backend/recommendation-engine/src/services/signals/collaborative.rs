use async_trait::async_trait;
use std::sync::Arc;

use super::{SignalOutcome, SignalProvider, SignalRequest};
use crate::error::RecommendError;
use crate::models::{SignalScore, SignalSource};
use crate::services::collaborative::CollaborativeFilteringEngine;

/// Exposes the CF engine's blended predictions as a signal
pub struct CollaborativeSignal {
    engine: Arc<CollaborativeFilteringEngine>,
    blend_ratio: f64,
}

impl CollaborativeSignal {
    pub fn new(engine: Arc<CollaborativeFilteringEngine>, blend_ratio: f64) -> Self {
        Self {
            engine,
            blend_ratio,
        }
    }
}

#[async_trait]
impl SignalProvider for CollaborativeSignal {
    async fn score(&self, request: &SignalRequest) -> SignalOutcome {
        // Prediction blocks on the model lock while an update holds it, so it
        // runs off the async workers where the caller's timeout can still fire
        let engine = Arc::clone(&self.engine);
        let learner_id = request.learner.id.clone();
        let ids: Vec<String> = request.candidates.iter().map(|c| c.id.clone()).collect();
        let blend_ratio = self.blend_ratio;

        let task = tokio::task::spawn_blocking(move || {
            engine.score_candidates(&learner_id, &ids, blend_ratio)
        });

        let predictions = match task.await {
            Ok(Ok(predictions)) => predictions,
            Ok(Err(e)) => return SignalOutcome::Unavailable(e),
            Err(e) => {
                return SignalOutcome::Unavailable(RecommendError::SourceUnavailable {
                    signal: SignalSource::CollaborativeFiltering,
                    reason: format!("prediction task failed: {}", e),
                })
            }
        };

        let scores: Vec<SignalScore> = predictions
            .into_iter()
            .map(|(id, score)| SignalScore::new(id, SignalSource::CollaborativeFiltering, score))
            .collect();

        if scores.is_empty() {
            SignalOutcome::Empty("no pool candidate is known to the CF model".to_string())
        } else {
            SignalOutcome::Scores(scores)
        }
    }

    fn source(&self) -> SignalSource {
        SignalSource::CollaborativeFiltering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CfConfig;
    use crate::models::{Candidate, InteractionRecord, InteractionType, LearnerProfile};

    fn engine() -> Arc<CollaborativeFilteringEngine> {
        let engine = CollaborativeFilteringEngine::new(CfConfig {
            factors: 4,
            epochs: 20,
            batch_size: 2,
            learning_rate: 0.05,
            ..Default::default()
        });
        engine
            .fit(&[
                InteractionRecord::new("u1", "pku", InteractionType::Favorite, None),
                InteractionRecord::new("u2", "pku", InteractionType::Click, None),
                InteractionRecord::new("u2", "fudan", InteractionType::Apply, None),
            ])
            .unwrap();
        Arc::new(engine)
    }

    fn request(learner: &str) -> SignalRequest {
        SignalRequest {
            learner: LearnerProfile {
                id: learner.to_string(),
                ..Default::default()
            },
            candidates: vec![
                Candidate {
                    id: "fudan".to_string(),
                    ..Default::default()
                },
                Candidate {
                    id: "unknown".to_string(),
                    ..Default::default()
                },
            ],
            advisory: Vec::new(),
            profile_vector: None,
        }
    }

    #[tokio::test]
    async fn test_cold_start_is_unavailable() {
        let signal = CollaborativeSignal::new(engine(), 0.5);
        let outcome = signal.score(&request("newcomer")).await;
        assert!(matches!(
            outcome,
            SignalOutcome::Unavailable(RecommendError::ColdStart(_))
        ));
    }

    #[tokio::test]
    async fn test_untrained_is_unavailable() {
        let signal = CollaborativeSignal::new(
            Arc::new(CollaborativeFilteringEngine::new(CfConfig::default())),
            0.5,
        );
        assert!(signal.score(&request("u1")).await.is_unavailable());
    }

    #[tokio::test]
    async fn test_scores_known_candidates() {
        let signal = CollaborativeSignal::new(engine(), 0.5);
        let outcome = signal.score(&request("u1")).await;

        let scores = outcome.scores();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].candidate_id, "fudan");
        assert_eq!(scores[0].source, SignalSource::CollaborativeFiltering);
    }
}
