pub mod aggregation;
pub mod categorizer;
pub mod collaborative;
pub mod content;
pub mod dataset;
pub mod engine;
pub mod interactions;
pub mod profile;
pub mod profile_model;
pub mod score_prediction;
pub mod signals;
pub mod strategy;

pub use aggregation::{Preferences, SignalAggregator};
pub use categorizer::Categorizer;
pub use collaborative::{CfSnapshot, CollaborativeFilteringEngine, TrainingReport, UpdateOutcome};
pub use content::ContentBasedScorer;
pub use dataset::{DatasetConfig, DemoDataset};
pub use engine::{RecommendRequest, RecommendationEngine};
pub use interactions::InteractionStore;
pub use profile::ProfileVectorizer;
pub use profile_model::ProfileModelScorer;
pub use score_prediction::ScorePredictionScorer;
pub use signals::{SignalOutcome, SignalProvider, SignalRequest};
pub use strategy::{Strategy, StrategyPolicy};
