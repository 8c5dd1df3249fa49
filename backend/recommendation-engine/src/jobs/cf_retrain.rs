// ============================================
// CF Retrain Job (協同過濾模型重訓任務)
// ============================================
//
// Periodically refits the collaborative filtering model from the full
// interaction store. Incremental updates keep the model roughly current
// between passes; this job restores a clean fit.
//
// Workflow:
// 1. Skip the pass if the store is too small or nothing changed
// 2. Refit on a blocking thread (the previous model keeps serving)
// 3. Write a JSON snapshot of the new model, if a path is configured

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{Config, RetrainConfig};
use crate::services::engine::RecommendationEngine;

/// Outcome of one pass
#[derive(Debug, Clone, Default)]
pub struct RetrainStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub interactions: usize,
    pub learners: usize,
    pub new_interactions: usize,
    pub trained: bool,
    pub skipped_reason: Option<String>,
    pub final_loss: Option<f64>,
    pub snapshot_written: bool,
    pub total_duration_ms: u64,
}

pub struct CfRetrainJob {
    config: RetrainConfig,
    engine: Arc<RecommendationEngine>,
    snapshot_path: Option<PathBuf>,
    /// Store size at the last successful fit
    trained_len: AtomicUsize,
}

impl CfRetrainJob {
    pub fn new(
        config: RetrainConfig,
        engine: Arc<RecommendationEngine>,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            engine,
            snapshot_path,
            trained_len: AtomicUsize::new(0),
        }
    }

    pub fn from_config(app_config: &Config, engine: Arc<RecommendationEngine>) -> Self {
        Self::new(
            app_config.retrain.clone(),
            engine,
            app_config.service.snapshot_path.as_ref().map(PathBuf::from),
        )
    }

    /// Mark the current store contents as already trained on
    pub fn mark_trained(&self) {
        self.trained_len
            .store(self.engine.store().len(), Ordering::Relaxed);
    }

    /// Run passes until `run_once` or forever
    pub async fn run(&self) -> Result<RetrainStats> {
        loop {
            let stats = self.run_single_pass().await?;

            info!(
                interactions = stats.interactions,
                learners = stats.learners,
                new_interactions = stats.new_interactions,
                trained = stats.trained,
                skipped = stats.skipped_reason.as_deref().unwrap_or("-"),
                duration_ms = stats.total_duration_ms,
                "CF retrain pass completed"
            );

            if self.config.run_once {
                return Ok(stats);
            }

            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
    }

    /// One retrain pass. Training failures are reported in the stats, not
    /// returned; only snapshot I/O errors abort the job.
    pub async fn run_single_pass(&self) -> Result<RetrainStats> {
        let start_time = Instant::now();
        let mut stats = RetrainStats {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let store = self.engine.store();
        stats.interactions = store.len();
        stats.learners = store.learner_count();
        stats.new_interactions = stats
            .interactions
            .saturating_sub(self.trained_len.load(Ordering::Relaxed));

        let skip = if stats.interactions < self.config.min_interactions {
            Some(format!(
                "only {} interactions, need {}",
                stats.interactions, self.config.min_interactions
            ))
        } else if stats.new_interactions == 0 && self.engine.collaborative().is_trained() {
            Some("no new interactions".to_string())
        } else {
            None
        };

        if let Some(reason) = skip {
            stats.skipped_reason = Some(reason);
        } else {
            match self.engine.retrain().await {
                Ok(report) => {
                    self.trained_len.store(stats.interactions, Ordering::Relaxed);
                    stats.trained = true;
                    stats.final_loss = report.final_loss();
                    stats.snapshot_written = self.write_snapshot().await?;
                }
                Err(e) => {
                    error!(error = %e, "CF retrain failed, previous model kept");
                    stats.skipped_reason = Some(e.to_string());
                }
            }
        }

        stats.completed_at = Some(Utc::now());
        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

        Ok(stats)
    }

    async fn write_snapshot(&self) -> Result<bool> {
        let Some(path) = &self.snapshot_path else {
            return Ok(false);
        };

        let Some(snapshot) = self.engine.collaborative().snapshot() else {
            warn!("No trained model to snapshot");
            return Ok(false);
        };

        let json = snapshot.to_json()?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write CF snapshot to {}", path.display()))?;

        info!(path = %path.display(), "CF snapshot written");
        Ok(true)
    }
}

/// Entry point for running the retrain job against an engine
pub async fn run_cf_retrain_job(config: &Config, engine: Arc<RecommendationEngine>) -> Result<()> {
    info!(
        interval_secs = config.retrain.interval_secs,
        run_once = config.retrain.run_once,
        "Initializing CF retrain job"
    );

    let job = CfRetrainJob::from_config(config, engine);
    job.mark_trained();
    let stats = job.run().await?;

    info!(
        trained = stats.trained,
        final_loss = stats.final_loss.unwrap_or_default(),
        "CF retrain job completed"
    );

    Ok(())
}
