pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{RecommendError, Result};
pub use services::{
    CollaborativeFilteringEngine, InteractionStore, RecommendRequest, RecommendationEngine,
    StrategyPolicy,
};
