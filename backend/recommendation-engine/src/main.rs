use anyhow::{Context, Result};
use recommendation_engine::services::collaborative::CfSnapshot;
use recommendation_engine::services::{DatasetConfig, DemoDataset, ProfileVectorizer};
use recommendation_engine::{
    jobs::run_cf_retrain_job, CollaborativeFilteringEngine, Config, InteractionStore,
    RecommendRequest, RecommendationEngine,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env().context("Failed to load config")?;
    config.validate()?;

    info!(
        service = %config.service.service_name,
        factors = config.cf.factors,
        retrain_interval_secs = config.retrain.interval_secs,
        "Starting recommendation engine"
    );

    // Interaction history: a JSON file, or generated demo data
    let demo = if config.service.interactions_path.is_none() {
        warn!("No interactions file configured, generating demo data");
        Some(DemoDataset::generate(&DatasetConfig::default()))
    } else {
        None
    };

    let store = match (&config.service.interactions_path, &demo) {
        (Some(path), _) => InteractionStore::load_json(path)?,
        (None, Some(dataset)) => InteractionStore::from_records(dataset.interactions.clone()),
        (None, None) => InteractionStore::new(),
    };
    let store = Arc::new(store);

    // Initialize CF engine, restoring the last snapshot when there is one
    let cf = Arc::new(CollaborativeFilteringEngine::new(config.cf.clone()));
    if let Some(path) = config.service.snapshot_path.as_deref() {
        if Path::new(path).exists() {
            match tokio::fs::read_to_string(path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|json| CfSnapshot::from_json(&json).map_err(anyhow::Error::from))
            {
                Ok(snapshot) => cf.restore(snapshot),
                Err(e) => warn!(path = %path, error = %e, "Ignoring unreadable CF snapshot"),
            }
        }
    }

    let mut engine = RecommendationEngine::new(&config, Arc::clone(&cf), store);
    if let Some(dataset) = &demo {
        let mut vectorizer = ProfileVectorizer::new(config.profile.embedding_dim);
        vectorizer.fit_normalizer(&dataset.learners)?;
        engine = engine.with_vectorizer(vectorizer);
    }
    let engine = Arc::new(engine);

    if !cf.is_trained() {
        match engine.retrain().await {
            Ok(report) => info!(
                learners = report.learners,
                candidates = report.candidates,
                interactions = report.interactions,
                "Initial CF fit completed"
            ),
            Err(e) => warn!(error = %e, "Initial CF fit failed, CF signal disabled until retrain"),
        }
    }

    // Smoke request against the demo pool
    if let Some((dataset, learner)) = demo
        .as_ref()
        .and_then(|d| d.learners.first().map(|l| (d, l.clone())))
    {
        let result = engine
            .recommend(RecommendRequest::new(learner, dataset.candidates.clone()))
            .await?;
        info!(
            strategy = %result.strategy,
            challenge = result.challenge.len(),
            matched = result.matched.len(),
            safety = result.safety.len(),
            "Demo recommendation generated"
        );
    }

    // Start retrain job
    let job_config = config.clone();
    let job_engine = Arc::clone(&engine);
    let job = tokio::spawn(async move {
        if let Err(e) = run_cf_retrain_job(&job_config, job_engine).await {
            error!(error = %e, "CF retrain job failed");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            if let Some(path) = config.service.interactions_path.as_deref() {
                let json = engine.store().to_json()?;
                tokio::fs::write(path, json)
                    .await
                    .with_context(|| format!("Failed to persist interactions to {}", path))?;
                info!(path = %path, interactions = engine.store().len(), "Interactions persisted");
            }
        }
        res = job => {
            if let Err(e) = res {
                error!(error = %e, "CF retrain job panicked");
            }
        }
    }

    Ok(())
}
