mod advisory;
mod collaborative;

use async_trait::async_trait;
use ndarray::Array1;

use crate::error::RecommendError;
use crate::models::{Candidate, LearnerProfile, SignalScore, SignalSource};

pub use advisory::AdvisorySignal;
pub use collaborative::CollaborativeSignal;

/// Everything a signal source may look at for one request
#[derive(Debug, Clone, Default)]
pub struct SignalRequest {
    pub learner: LearnerProfile,
    pub candidates: Vec<Candidate>,
    /// Externally produced advisory scores, passed through as-is
    pub advisory: Vec<SignalScore>,
    /// Learner vector from the profile vectorizer, set by the engine
    pub profile_vector: Option<Array1<f64>>,
}

/// Result of asking one source for scores
#[derive(Debug)]
pub enum SignalOutcome {
    Scores(Vec<SignalScore>),
    /// Source ran but had nothing to contribute
    Empty(String),
    /// Source failed, timed out or hit cold start; it weighs 0 for this request
    Unavailable(RecommendError),
}

impl SignalOutcome {
    pub fn scores(&self) -> &[SignalScore] {
        match self {
            SignalOutcome::Scores(scores) => scores,
            _ => &[],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, SignalOutcome::Unavailable(_))
    }
}

/// Signal source trait
#[async_trait]
pub trait SignalProvider: Send + Sync {
    async fn score(&self, request: &SignalRequest) -> SignalOutcome;
    fn source(&self) -> SignalSource;
}
