// ============================================
// Collaborative Filtering Engine (協同過濾)
// ============================================
//
// Hybrid of an item-neighbourhood model and a biased latent-factor model,
// both built from the learner × candidate interaction matrix.
//
//   score = blend * latent + (1 - blend) * neighbourhood
//
// The neighbourhood part is the similarity-weighted average of the ratings
// the learner gave to other candidates. All state sits behind one RwLock:
// `update` is the single writer, `predict` only ever reads.

pub mod factorization;
pub mod matrix;
pub mod neighbors;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::CfConfig;
use crate::error::{RecommendError, Result};
use crate::models::{clamp_unit, InteractionRecord, SignalSource};

pub use factorization::{LatentFactorModel, TrainingParams};
pub use matrix::InteractionMatrix;
pub use neighbors::KnnIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CfState {
    learner_index: HashMap<String, usize>,
    candidate_index: HashMap<String, usize>,
    candidate_ids: Vec<String>,
    matrix: InteractionMatrix,
    similarity: Array2<f64>,
    knn: KnnIndex,
    model: LatentFactorModel,
    trained_at: DateTime<Utc>,
}

/// Serializable copy of a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfSnapshot {
    state: CfState,
}

impl CfSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.state.trained_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub learners: usize,
    pub candidates: usize,
    pub interactions: usize,
    pub epoch_losses: Vec<f64>,
    pub trained_at: DateTime<Utc>,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    UnknownLearner,
    UnknownCandidate,
    NotTrained,
}

#[derive(Debug, Clone, Serialize)]
pub struct CfStats {
    pub learners: usize,
    pub candidates: usize,
    pub interactions: usize,
    pub trained_at: DateTime<Utc>,
}

pub struct CollaborativeFilteringEngine {
    params: CfConfig,
    state: RwLock<Option<CfState>>,
}

impl CollaborativeFilteringEngine {
    pub fn new(params: CfConfig) -> Self {
        Self {
            params,
            state: RwLock::new(None),
        }
    }

    pub fn from_snapshot(params: CfConfig, snapshot: CfSnapshot) -> Self {
        Self {
            params,
            state: RwLock::new(Some(snapshot.state)),
        }
    }

    pub fn params(&self) -> &CfConfig {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().is_some()
    }

    /// Batch (re)train from scratch.
    ///
    /// The new model is built without holding the lock and swapped in only
    /// on success, so a failed fit leaves the previous model serving.
    pub fn fit(&self, interactions: &[InteractionRecord]) -> Result<TrainingReport> {
        let start = Instant::now();

        match build_state(&self.params, interactions) {
            Ok((state, report)) => {
                *self.state.write() = Some(state);
                info!(
                    learners = report.learners,
                    candidates = report.candidates,
                    interactions = report.interactions,
                    final_loss = report.final_loss().unwrap_or_default(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "CF model trained"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    error = %e,
                    keeps_previous = self.is_trained(),
                    "CF training failed"
                );
                Err(e)
            }
        }
    }

    /// Whether the learner has any rating in the model
    pub fn has_history(&self, learner_id: &str) -> bool {
        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            return false;
        };
        state
            .learner_index
            .get(learner_id)
            .map_or(false, |&u| !state.matrix.row(u).is_empty())
    }

    /// Blended CF score for each candidate known to the model.
    ///
    /// Returns an empty list on cold start or before the first fit.
    /// Unknown candidate ids are omitted.
    pub fn predict(
        &self,
        learner_id: &str,
        candidate_ids: &[String],
        blend_ratio: f64,
    ) -> Vec<(String, f64)> {
        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            debug!(learner_id = %learner_id, "CF model not trained yet");
            return Vec::new();
        };

        let Some(&u) = state.learner_index.get(learner_id) else {
            debug!(learner_id = %learner_id, "CF cold start");
            return Vec::new();
        };

        blended_scores(state, u, candidate_ids, blend_ratio)
    }

    /// Like `predict`, but reports why nothing could be scored.
    ///
    /// Model state and learner history are checked under the same read lock
    /// as the scoring itself.
    pub fn score_candidates(
        &self,
        learner_id: &str,
        candidate_ids: &[String],
        blend_ratio: f64,
    ) -> Result<Vec<(String, f64)>> {
        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            return Err(RecommendError::SourceUnavailable {
                signal: SignalSource::CollaborativeFiltering,
                reason: "model not trained".to_string(),
            });
        };

        match state.learner_index.get(learner_id) {
            Some(&u) if !state.matrix.row(u).is_empty() => {
                Ok(blended_scores(state, u, candidate_ids, blend_ratio))
            }
            _ => Err(RecommendError::ColdStart(learner_id.to_string())),
        }
    }

    /// Incremental update for one new rating
    pub fn update(&self, learner_id: &str, candidate_id: &str, rating: f64) -> UpdateOutcome {
        let mut guard = self.state.write();
        let Some(state) = guard.as_mut() else {
            warn!(learner_id = %learner_id, candidate_id = %candidate_id, "CF update before first fit ignored");
            return UpdateOutcome::NotTrained;
        };

        let Some(&u) = state.learner_index.get(learner_id) else {
            warn!(learner_id = %learner_id, "CF update for unknown learner ignored");
            return UpdateOutcome::UnknownLearner;
        };
        let Some(&i) = state.candidate_index.get(candidate_id) else {
            warn!(candidate_id = %candidate_id, "CF update for unknown candidate ignored");
            return UpdateOutcome::UnknownCandidate;
        };

        let rating = clamp_unit(rating);
        state.matrix.set(u, i, rating);

        let row = state.matrix.similarity_row(i);
        for (j, sim) in row.into_iter().enumerate() {
            state.similarity[[i, j]] = sim;
            state.similarity[[j, i]] = sim;
        }
        let refreshed = state.knn.refresh(&state.similarity, i);

        state
            .model
            .online_step(u, i, rating, self.params.learning_rate);

        debug!(
            learner_id = %learner_id,
            candidate_id = %candidate_id,
            rating = rating,
            knn_lists_refreshed = refreshed,
            "CF model updated"
        );

        UpdateOutcome::Applied
    }

    /// Most similar candidates by interaction pattern
    pub fn nearest_candidates(&self, candidate_id: &str, n: usize) -> Vec<(String, f64)> {
        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            return Vec::new();
        };
        let Some(&i) = state.candidate_index.get(candidate_id) else {
            return Vec::new();
        };

        state
            .knn
            .neighbors(i)
            .iter()
            .take(n)
            .map(|(j, sim)| (state.candidate_ids[*j].clone(), *sim))
            .collect()
    }

    pub fn stats(&self) -> Option<CfStats> {
        self.state.read().as_ref().map(|state| CfStats {
            learners: state.learner_index.len(),
            candidates: state.candidate_ids.len(),
            interactions: state.matrix.nnz(),
            trained_at: state.trained_at,
        })
    }

    pub fn snapshot(&self) -> Option<CfSnapshot> {
        self.state
            .read()
            .as_ref()
            .map(|state| CfSnapshot { state: state.clone() })
    }

    /// Replace the serving model with a snapshot
    pub fn restore(&self, snapshot: CfSnapshot) {
        info!(trained_at = %snapshot.trained_at(), "CF model restored from snapshot");
        *self.state.write() = Some(snapshot.state);
    }

    /// Run `f` while holding the model write lock
    #[cfg(test)]
    pub(crate) fn with_write_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.state.write();
        f()
    }
}

fn validate_params(params: &CfConfig) -> Result<()> {
    if params.factors == 0 || params.epochs == 0 || params.batch_size == 0 {
        return Err(RecommendError::TrainingError(
            "factors, epochs and batch size must be greater than 0".to_string(),
        ));
    }
    if !(params.learning_rate > 0.0 && params.learning_rate <= 1.0) {
        return Err(RecommendError::TrainingError(format!(
            "learning rate {} outside (0, 1]",
            params.learning_rate
        )));
    }
    if !(params.regularization >= 0.0 && params.regularization.is_finite()) {
        return Err(RecommendError::TrainingError(format!(
            "regularization {} must be non-negative",
            params.regularization
        )));
    }
    Ok(())
}

/// Candidates the learner already rated are scored too, so feedback on
/// (u, i) shows up in the next prediction for i.
fn blended_scores(
    state: &CfState,
    u: usize,
    candidate_ids: &[String],
    blend_ratio: f64,
) -> Vec<(String, f64)> {
    let blend = blend_ratio.clamp(0.0, 1.0);
    let row = state.matrix.row(u);

    candidate_ids
        .iter()
        .filter_map(|id| {
            let &i = state.candidate_index.get(id)?;

            let (mut weighted, mut total) = (0.0, 0.0);
            for (&j, &rating) in row.iter().filter(|(j, _)| **j != i) {
                weighted += state.similarity[[i, j]] * rating;
                total += rating;
            }
            let neighborhood = if total > f64::EPSILON {
                weighted / total
            } else {
                0.0
            };

            let latent = clamp_unit(state.model.predict(u, i));
            let score = clamp_unit(blend * latent + (1.0 - blend) * neighborhood);
            Some((id.clone(), score))
        })
        .collect()
}

fn build_state(
    params: &CfConfig,
    interactions: &[InteractionRecord],
) -> Result<(CfState, TrainingReport)> {
    validate_params(params)?;
    if interactions.is_empty() {
        return Err(RecommendError::TrainingError(
            "no interactions to train on".to_string(),
        ));
    }

    // Index ids in order of first appearance
    let mut learner_index: HashMap<String, usize> = HashMap::new();
    let mut candidate_index: HashMap<String, usize> = HashMap::new();
    let mut candidate_ids: Vec<String> = Vec::new();
    for record in interactions {
        let next = learner_index.len();
        learner_index
            .entry(record.learner_id.clone())
            .or_insert(next);
        if !candidate_index.contains_key(&record.candidate_id) {
            candidate_index.insert(record.candidate_id.clone(), candidate_ids.len());
            candidate_ids.push(record.candidate_id.clone());
        }
    }

    let mut matrix = InteractionMatrix::new(learner_index.len(), candidate_ids.len());
    for record in interactions {
        let u = learner_index[&record.learner_id];
        let i = candidate_index[&record.candidate_id];
        matrix.set(u, i, clamp_unit(record.rating));
    }

    let similarity = matrix.similarity_matrix();
    let knn = KnnIndex::build(&similarity, params.neighbors);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut model = LatentFactorModel::new(
        learner_index.len(),
        candidate_ids.len(),
        params.factors,
        &mut rng,
    );
    let samples = matrix.entries();
    let epoch_losses = model.train(
        &samples,
        TrainingParams {
            epochs: params.epochs,
            batch_size: params.batch_size,
            learning_rate: params.learning_rate,
            regularization: params.regularization,
        },
        &mut rng,
    )?;

    let trained_at = Utc::now();
    let report = TrainingReport {
        learners: learner_index.len(),
        candidates: candidate_ids.len(),
        interactions: samples.len(),
        epoch_losses,
        trained_at,
    };

    let state = CfState {
        learner_index,
        candidate_index,
        candidate_ids,
        matrix,
        similarity,
        knn,
        model,
        trained_at,
    };

    Ok((state, report))
}
