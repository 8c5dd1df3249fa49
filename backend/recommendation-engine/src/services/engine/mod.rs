// ============================================
// Recommendation Engine (混合推薦引擎)
// ============================================
//
// Entry point for the two public operations:
//
//   recommend: validate → signals (concurrent, time-boxed) → aggregate
//              → categorize
//   feedback:  append to the interaction store → incremental CF update
//
// All collaborators are injected; nothing here is a global.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{Config, ContentScorerKind, SignalConfig, SourceWeights};
use crate::error::{RecommendError, Result};
use crate::models::{
    Candidate, InteractionRecord, InteractionType, LearnerProfile, SignalScore, SignalSource,
    TieredRecommendations,
};
use crate::services::aggregation::{Preferences, SignalAggregator};
use crate::services::categorizer::Categorizer;
use crate::services::collaborative::{CollaborativeFilteringEngine, TrainingReport, UpdateOutcome};
use crate::services::content::ContentBasedScorer;
use crate::services::interactions::InteractionStore;
use crate::services::profile::ProfileVectorizer;
use crate::services::profile_model::ProfileModelScorer;
use crate::services::score_prediction::ScorePredictionScorer;
use crate::services::signals::{
    AdvisorySignal, CollaborativeSignal, SignalOutcome, SignalProvider, SignalRequest,
};
use crate::services::strategy::StrategyPolicy;

/// Inputs of one `recommend` call
#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub learner: LearnerProfile,
    pub candidates: Vec<Candidate>,
    /// aggressive / balanced / conservative; anything else means balanced
    pub strategy: String,
    pub num_recommendations: usize,
    pub preferred_provinces: Vec<String>,
    pub preferred_types: Vec<String>,
    /// Externally produced advisory scores
    pub advisory: Vec<SignalScore>,
}

impl RecommendRequest {
    pub fn new(learner: LearnerProfile, candidates: Vec<Candidate>) -> Self {
        Self {
            learner,
            candidates,
            strategy: "balanced".to_string(),
            num_recommendations: 9,
            preferred_provinces: Vec::new(),
            preferred_types: Vec::new(),
            advisory: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn with_count(mut self, n: usize) -> Self {
        self.num_recommendations = n;
        self
    }

    pub fn with_preferences(mut self, provinces: Vec<String>, school_types: Vec<String>) -> Self {
        self.preferred_provinces = provinces;
        self.preferred_types = school_types;
        self
    }

    pub fn with_advisory(mut self, advisory: Vec<SignalScore>) -> Self {
        self.advisory = advisory;
        self
    }
}

pub struct RecommendationEngine {
    providers: Vec<Arc<dyn SignalProvider>>,
    aggregator: SignalAggregator,
    categorizer: Categorizer,
    policy: StrategyPolicy,
    base_weights: SourceWeights,
    vectorizer: ProfileVectorizer,
    cf: Arc<CollaborativeFilteringEngine>,
    store: Arc<InteractionStore>,
    semaphore: Arc<Semaphore>,
    source_timeout: Duration,
}

impl RecommendationEngine {
    /// Engine with the four standard signal sources
    pub fn new(
        config: &Config,
        cf: Arc<CollaborativeFilteringEngine>,
        store: Arc<InteractionStore>,
    ) -> Self {
        let content: Arc<dyn SignalProvider> = match config.signals.content_scorer {
            ContentScorerKind::Keyword => Arc::new(ContentBasedScorer::new()),
            ContentScorerKind::ProfileModel => {
                Arc::new(ProfileModelScorer::new(config.profile.embedding_dim))
            }
        };
        let providers: Vec<Arc<dyn SignalProvider>> = vec![
            Arc::new(AdvisorySignal::new()),
            Arc::new(CollaborativeSignal::new(Arc::clone(&cf), config.cf.blend_ratio)),
            content,
            Arc::new(ScorePredictionScorer::new()),
        ];
        Self::with_providers(config, providers, cf, store)
    }

    /// Engine with a caller-chosen set of signal sources
    pub fn with_providers(
        config: &Config,
        providers: Vec<Arc<dyn SignalProvider>>,
        cf: Arc<CollaborativeFilteringEngine>,
        store: Arc<InteractionStore>,
    ) -> Self {
        let SignalConfig {
            source_timeout_ms,
            max_concurrent_sources,
            preference_boost,
            ..
        } = config.signals.clone();

        Self {
            providers,
            aggregator: SignalAggregator::new(preference_boost),
            categorizer: Categorizer::new(),
            policy: StrategyPolicy::new(config.strategies, config.weights),
            base_weights: config.weights,
            vectorizer: ProfileVectorizer::new(config.profile.embedding_dim),
            cf,
            store,
            semaphore: Arc::new(Semaphore::new(max_concurrent_sources.max(1))),
            source_timeout: Duration::from_millis(source_timeout_ms),
        }
    }

    /// Replace the profile vectorizer, e.g. with one fitted on a population
    pub fn with_vectorizer(mut self, vectorizer: ProfileVectorizer) -> Self {
        self.vectorizer = vectorizer;
        self
    }

    pub fn vectorizer(&self) -> &ProfileVectorizer {
        &self.vectorizer
    }

    pub fn collaborative(&self) -> &Arc<CollaborativeFilteringEngine> {
        &self.cf
    }

    pub fn store(&self) -> &Arc<InteractionStore> {
        &self.store
    }

    /// Rank and tier a candidate pool for one learner.
    ///
    /// Only invalid input is an error. Failing or slow sources are dropped
    /// for this request and listed in `unavailable_sources`.
    pub async fn recommend(&self, request: RecommendRequest) -> Result<TieredRecommendations> {
        let start = Instant::now();

        request.learner.validate()?;
        for candidate in &request.candidates {
            candidate.validate()?;
        }
        let profile_vector = self.vectorizer.vectorize(&request.learner)?;

        let strategy = self.policy.resolve(&request.strategy);
        let weights = self.policy.weights(strategy);
        let n = request.num_recommendations;

        if request.candidates.is_empty() || n == 0 {
            debug!(
                learner_id = %request.learner.id,
                pool = request.candidates.len(),
                requested = n,
                "Nothing to recommend"
            );
            let mut empty = TieredRecommendations::empty(strategy.as_str());
            empty.max_achievable = weights.total();
            return Ok(empty);
        }

        let preferences = Preferences::new(request.preferred_provinces, request.preferred_types);
        let signal_request = SignalRequest {
            learner: request.learner,
            candidates: request.candidates,
            advisory: request.advisory,
            profile_vector: Some(profile_vector),
        };

        let (signals, unavailable) = self.collect_signals(&signal_request).await;

        let composites = self.aggregator.aggregate(
            &signal_request.candidates,
            &signals,
            &weights,
            &preferences,
        );
        let quota = self.policy.quotas_for(strategy, n);
        let mut result = self
            .categorizer
            .categorize(composites, quota, weights.total(), strategy);
        result.unavailable_sources = unavailable;

        info!(
            learner_id = %signal_request.learner.id,
            strategy = %strategy,
            pool = signal_request.candidates.len(),
            requested = n,
            challenge = result.challenge.len(),
            matched = result.matched.len(),
            safety = result.safety.len(),
            unavailable = result.unavailable_sources.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recommendations generated"
        );

        Ok(result)
    }

    /// Run every enabled source concurrently under the timeout and the
    /// concurrency limit
    async fn collect_signals(&self, request: &SignalRequest) -> (Vec<SignalScore>, Vec<SignalSource>) {
        let timeout = self.source_timeout;

        let tasks = self
            .providers
            .iter()
            .filter(|provider| self.base_weights.get(provider.source()) > 0.0)
            .map(|provider| {
                let semaphore = Arc::clone(&self.semaphore);
                async move {
                    let source = provider.source();
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => match tokio::time::timeout(timeout, provider.score(request)).await {
                            Ok(outcome) => outcome,
                            Err(_) => SignalOutcome::Unavailable(RecommendError::SourceUnavailable {
                                signal: source,
                                reason: format!("timed out after {}ms", timeout.as_millis()),
                            }),
                        },
                        Err(e) => SignalOutcome::Unavailable(RecommendError::SourceUnavailable {
                            signal: source,
                            reason: e.to_string(),
                        }),
                    };
                    (source, outcome)
                }
            });

        let mut signals = Vec::new();
        let mut unavailable = Vec::new();

        for (source, outcome) in join_all(tasks).await {
            match outcome {
                SignalOutcome::Scores(scores) => {
                    debug!(source = %source, scores = scores.len(), "Signal source returned scores");
                    signals.extend(scores);
                }
                SignalOutcome::Empty(reason) => {
                    debug!(source = %source, reason = %reason, "Signal source had nothing to add");
                }
                SignalOutcome::Unavailable(error) => {
                    warn!(source = %source, error = %error, "Signal source unavailable, continuing without it");
                    unavailable.push(source);
                }
            }
        }

        (signals, unavailable)
    }

    /// Record feedback and update the CF model in the background.
    ///
    /// Outside a Tokio runtime the update is applied before returning.
    pub fn feedback(
        &self,
        learner_id: &str,
        candidate_id: &str,
        interaction_type: InteractionType,
        rating: Option<f64>,
    ) -> Result<()> {
        let record = self.record_feedback(learner_id, candidate_id, interaction_type, rating)?;

        let cf = Arc::clone(&self.cf);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    cf.update(&record.learner_id, &record.candidate_id, record.rating)
                });
            }
            Err(_) => {
                debug!(learner_id = %learner_id, "No async runtime, applying CF update inline");
                cf.update(&record.learner_id, &record.candidate_id, record.rating);
            }
        }

        Ok(())
    }

    /// Record feedback and wait for the CF update to land
    pub async fn feedback_sync(
        &self,
        learner_id: &str,
        candidate_id: &str,
        interaction_type: InteractionType,
        rating: Option<f64>,
    ) -> Result<UpdateOutcome> {
        let record = self.record_feedback(learner_id, candidate_id, interaction_type, rating)?;

        let cf = Arc::clone(&self.cf);
        tokio::task::spawn_blocking(move || {
            cf.update(&record.learner_id, &record.candidate_id, record.rating)
        })
        .await
        .map_err(|e| RecommendError::TrainingError(format!("CF update task failed: {}", e)))
    }

    fn record_feedback(
        &self,
        learner_id: &str,
        candidate_id: &str,
        interaction_type: InteractionType,
        rating: Option<f64>,
    ) -> Result<InteractionRecord> {
        if learner_id.trim().is_empty() || candidate_id.trim().is_empty() {
            return Err(RecommendError::InputError(
                "feedback needs both a learner id and a candidate id".to_string(),
            ));
        }

        let record = InteractionRecord::new(learner_id, candidate_id, interaction_type, rating);
        let seq = self.store.append(record.clone());

        info!(
            seq = seq,
            learner_id = %learner_id,
            candidate_id = %candidate_id,
            interaction_type = interaction_type.as_str(),
            rating = record.rating,
            "Feedback recorded"
        );

        Ok(record)
    }

    /// Refit the CF model from everything in the interaction store.
    ///
    /// On failure the previous model keeps serving.
    pub async fn retrain(&self) -> Result<TrainingReport> {
        let records = self.store.snapshot();
        self.refit(records).await
    }

    /// Fit on `records`, then replay whatever reached the store after them.
    ///
    /// Updates that land while the fit runs go into the outgoing model and
    /// would otherwise be lost when the new one is swapped in.
    async fn refit(&self, records: Vec<InteractionRecord>) -> Result<TrainingReport> {
        let trained_len = records.len();
        let cf = Arc::clone(&self.cf);

        let report = tokio::task::spawn_blocking(move || cf.fit(&records))
            .await
            .map_err(|e| RecommendError::TrainingError(format!("training task failed: {}", e)))??;

        let missed = self.store.since(trained_len);
        if !missed.is_empty() {
            let replayed = missed.len();
            let cf = Arc::clone(&self.cf);
            tokio::task::spawn_blocking(move || {
                for record in &missed {
                    cf.update(&record.learner_id, &record.candidate_id, record.rating);
                }
            })
            .await
            .map_err(|e| RecommendError::TrainingError(format!("replay task failed: {}", e)))?;

            info!(replayed = replayed, "Replayed interactions recorded during training");
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::config::CfConfig;
    use crate::models::Tier;

    fn learner() -> LearnerProfile {
        LearnerProfile {
            id: "u1".to_string(),
            total_score: 640.0,
            province: Some("四川".to_string()),
            ..Default::default()
        }
    }

    fn candidate(id: &str, line: f64) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: id.to_uppercase(),
            admission_line: Some(line),
            school_type: "综合".to_string(),
            province: Some("四川".to_string()),
            ..Default::default()
        }
    }

    fn engine_with(providers: Vec<Arc<dyn SignalProvider>>, config: &Config) -> RecommendationEngine {
        RecommendationEngine::with_providers(
            config,
            providers,
            Arc::new(CollaborativeFilteringEngine::new(config.cf.clone())),
            Arc::new(InteractionStore::new()),
        )
    }

    struct SlowSignal;

    #[async_trait]
    impl SignalProvider for SlowSignal {
        async fn score(&self, _request: &SignalRequest) -> SignalOutcome {
            tokio::time::sleep(Duration::from_secs(5)).await;
            SignalOutcome::Empty("never reached".to_string())
        }

        fn source(&self) -> SignalSource {
            SignalSource::Advisory
        }
    }

    #[tokio::test]
    async fn test_invalid_learner_is_rejected() {
        let engine = RecommendationEngine::new(
            &Config::default(),
            Arc::new(CollaborativeFilteringEngine::new(CfConfig::default())),
            Arc::new(InteractionStore::new()),
        );
        let mut bad = learner();
        bad.total_score = f64::NAN;

        let err = engine
            .recommend(RecommendRequest::new(bad, vec![candidate("a", 600.0)]))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_empty_pool_is_empty_result() {
        let engine = engine_with(Vec::new(), &Config::default());
        let result = engine
            .recommend(RecommendRequest::new(learner(), Vec::new()).with_strategy("aggressive"))
            .await
            .unwrap();

        assert_eq!(result.total(), 0);
        assert_eq!(result.strategy, "aggressive");
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let mut config = Config::default();
        config.signals.source_timeout_ms = 20;
        let engine = engine_with(
            vec![Arc::new(SlowSignal), Arc::new(ScorePredictionScorer::new())],
            &config,
        );

        let result = engine
            .recommend(RecommendRequest::new(learner(), vec![candidate("a", 600.0)]).with_count(1))
            .await
            .unwrap();

        assert_eq!(result.unavailable_sources, vec![SignalSource::Advisory]);
        assert_eq!(result.total(), 1);
        assert_eq!(result.safety[0].candidate_id, "a");
    }

    #[tokio::test]
    async fn test_zero_weight_source_not_run() {
        let mut config = Config::default();
        config.signals.source_timeout_ms = 20;
        config.weights.advisory = 0.0;
        let engine = engine_with(
            vec![Arc::new(SlowSignal), Arc::new(ScorePredictionScorer::new())],
            &config,
        );

        let result = engine
            .recommend(RecommendRequest::new(learner(), vec![candidate("a", 600.0)]).with_count(1))
            .await
            .unwrap();
        assert!(result.unavailable_sources.is_empty());
    }

    #[tokio::test]
    async fn test_cold_start_learner_gets_results() {
        let engine = RecommendationEngine::new(
            &Config::default(),
            Arc::new(CollaborativeFilteringEngine::new(CfConfig::default())),
            Arc::new(InteractionStore::new()),
        );

        let pool = vec![candidate("a", 600.0), candidate("b", 660.0), candidate("c", 640.0)];
        let result = engine
            .recommend(RecommendRequest::new(learner(), pool).with_count(3))
            .await
            .unwrap();

        assert_eq!(result.total(), 3);
        assert!(result
            .unavailable_sources
            .contains(&SignalSource::CollaborativeFiltering));
        assert_eq!(result.tier(Tier::Challenge)[0].candidate_id, "b");
    }

    #[tokio::test]
    async fn test_feedback_rejects_empty_ids() {
        let engine = engine_with(Vec::new(), &Config::default());
        assert!(matches!(
            engine.feedback("", "a", InteractionType::Click, None),
            Err(RecommendError::InputError(_))
        ));
        assert!(engine.store().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_appends_to_store() {
        let engine = engine_with(Vec::new(), &Config::default());
        let outcome = engine
            .feedback_sync("u1", "a", InteractionType::Favorite, None)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::NotTrained);
        let records = engine.store().for_learner("u1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rating, 1.0);
    }

    #[tokio::test]
    async fn test_retrain_from_store() {
        let config = Config {
            cf: CfConfig {
                factors: 4,
                epochs: 5,
                ..CfConfig::default()
            },
            ..Config::default()
        };
        let engine = engine_with(Vec::new(), &config);

        assert!(engine.retrain().await.is_err());

        engine.feedback("u1", "a", InteractionType::Favorite, None).unwrap();
        engine.feedback("u2", "a", InteractionType::Click, None).unwrap();
        engine.feedback("u2", "b", InteractionType::Apply, None).unwrap();

        let report = engine.retrain().await.unwrap();
        assert_eq!(report.interactions, 3);
        assert!(engine.collaborative().has_history("u2"));
    }

    fn small_cf_config() -> Config {
        Config {
            cf: CfConfig {
                factors: 4,
                epochs: 5,
                ..CfConfig::default()
            },
            ..Config::default()
        }
    }

    async fn trained_engine(config: &Config) -> RecommendationEngine {
        let engine = RecommendationEngine::new(
            config,
            Arc::new(CollaborativeFilteringEngine::new(config.cf.clone())),
            Arc::new(InteractionStore::new()),
        );
        for (learner, candidate, kind) in [
            ("u1", "a", InteractionType::Favorite),
            ("u2", "a", InteractionType::Click),
            ("u2", "b", InteractionType::Apply),
        ] {
            engine.feedback_sync(learner, candidate, kind, None).await.unwrap();
        }
        engine.retrain().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_wrong_embedding_length_is_rejected() {
        let mut config = Config::default();
        config.profile.embedding_dim = 8;
        let engine = engine_with(vec![Arc::new(ScorePredictionScorer::new())], &config);

        let mut bad = learner();
        bad.interest_embedding = Some(vec![0.1, 0.2, 0.3]);
        let err = engine
            .recommend(RecommendRequest::new(bad, vec![candidate("a", 600.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendError::InputError(_)));

        let mut good = learner();
        good.interest_embedding = Some(vec![0.1; 8]);
        assert!(engine
            .recommend(RecommendRequest::new(good, vec![candidate("a", 600.0)]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_profile_model_fills_content_source() {
        let mut config = small_cf_config();
        config.profile.embedding_dim = 4;
        config.signals.content_scorer = ContentScorerKind::ProfileModel;
        let engine = RecommendationEngine::new(
            &config,
            Arc::new(CollaborativeFilteringEngine::new(config.cf.clone())),
            Arc::new(InteractionStore::new()),
        );

        let result = engine
            .recommend(RecommendRequest::new(learner(), vec![candidate("a", 600.0)]).with_count(1))
            .await
            .unwrap();

        assert!(!result.unavailable_sources.contains(&SignalSource::ContentBased));
        assert!(result.safety[0]
            .source_scores
            .contains_key(&SignalSource::ContentBased));
    }

    #[tokio::test]
    async fn test_cf_source_times_out_while_model_is_locked() {
        let mut config = small_cf_config();
        config.signals.source_timeout_ms = 50;
        let engine = trained_engine(&config).await;
        let pool = vec![candidate("a", 600.0), candidate("b", 640.0)];
        let mut known = learner();
        known.id = "u2".to_string();

        let unlocked = engine
            .recommend(RecommendRequest::new(known.clone(), pool.clone()))
            .await
            .unwrap();
        assert!(unlocked.unavailable_sources.is_empty());

        let cf = Arc::clone(engine.collaborative());
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            cf.with_write_lock(|| {
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(600));
            })
        });
        locked_rx.recv().unwrap();

        let start = Instant::now();
        let locked = engine
            .recommend(RecommendRequest::new(known, pool))
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(locked.unavailable_sources, vec![SignalSource::CollaborativeFiltering]);
        assert_eq!(locked.total(), 2);
        holder.join().unwrap();
    }

    #[test]
    fn test_feedback_outside_runtime_applies_inline() {
        let config = small_cf_config();
        let cf = Arc::new(CollaborativeFilteringEngine::new(config.cf.clone()));
        cf.fit(&[
            InteractionRecord::new("u1", "a", InteractionType::Favorite, None),
            InteractionRecord::new("u2", "b", InteractionType::Click, None),
        ])
        .unwrap();
        let engine = RecommendationEngine::new(&config, Arc::clone(&cf), Arc::new(InteractionStore::new()));

        engine
            .feedback("u1", "b", InteractionType::Favorite, None)
            .unwrap();

        assert_eq!(engine.store().len(), 1);
        assert_eq!(cf.stats().unwrap().interactions, 3);
    }

    #[tokio::test]
    async fn test_refit_replays_interactions_recorded_during_training() {
        let engine = trained_engine(&small_cf_config()).await;
        let records = engine.store().snapshot();

        // Lands in the outgoing model, as if recorded while the fit runs
        let outcome = engine
            .feedback_sync("u1", "b", InteractionType::Favorite, None)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        let report = engine.refit(records).await.unwrap();
        assert_eq!(report.interactions, 3);
        assert_eq!(engine.collaborative().stats().unwrap().interactions, 4);
    }
}
