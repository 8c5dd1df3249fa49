use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{RecommendError, Result};

/// Biased matrix factorization:
/// `global + learner_bias[u] + candidate_bias[i] + dot(P[u], Q[i])`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatentFactorModel {
    learner_factors: Array2<f64>,
    candidate_factors: Array2<f64>,
    learner_bias: Array1<f64>,
    candidate_bias: Array1<f64>,
    global_bias: f64,
}

/// Hyperparameters for one training run
#[derive(Debug, Clone, Copy)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub regularization: f64,
}

#[derive(Default)]
struct Gradient {
    factors: HashMap<usize, Array1<f64>>,
    bias: HashMap<usize, f64>,
}

impl Gradient {
    fn add(&mut self, index: usize, factor_grad: Array1<f64>, bias_grad: f64) {
        self.factors
            .entry(index)
            .and_modify(|g| *g += &factor_grad)
            .or_insert(factor_grad);
        *self.bias.entry(index).or_insert(0.0) += bias_grad;
    }
}

impl LatentFactorModel {
    /// Factors start uniform in [0, 0.05), biases uniform in [-0.01, 0.01)
    pub fn new(n_learners: usize, n_candidates: usize, k: usize, rng: &mut StdRng) -> Self {
        let mut uniform = |rows: usize, low: f64, high: f64| -> Array2<f64> {
            Array2::from_shape_simple_fn((rows, k), || rng.gen_range(low..high))
        };
        let learner_factors = uniform(n_learners, 0.0, 0.05);
        let candidate_factors = uniform(n_candidates, 0.0, 0.05);

        let learner_bias = Array1::from_shape_simple_fn(n_learners, || rng.gen_range(-0.01..0.01));
        let candidate_bias =
            Array1::from_shape_simple_fn(n_candidates, || rng.gen_range(-0.01..0.01));

        Self {
            learner_factors,
            candidate_factors,
            learner_bias,
            candidate_bias,
            global_bias: 0.0,
        }
    }

    pub fn factors(&self) -> usize {
        self.learner_factors.ncols()
    }

    /// Raw (unclamped) predicted rating
    pub fn predict(&self, learner: usize, candidate: usize) -> f64 {
        self.global_bias
            + self.learner_bias[learner]
            + self.candidate_bias[candidate]
            + self
                .learner_factors
                .row(learner)
                .dot(&self.candidate_factors.row(candidate))
    }

    /// Mini-batch gradient descent on MSE with L2 on factors and biases.
    ///
    /// Returns the mean squared error of each epoch, measured before each
    /// batch's update.
    pub fn train(
        &mut self,
        samples: &[(usize, usize, f64)],
        params: TrainingParams,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        if samples.is_empty() {
            return Err(RecommendError::TrainingError(
                "no samples to train on".to_string(),
            ));
        }

        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut losses = Vec::with_capacity(params.epochs);

        for epoch in 0..params.epochs {
            order.shuffle(rng);
            let mut squared_error = 0.0;

            for batch in order.chunks(params.batch_size) {
                squared_error += self.train_batch(samples, batch, params);
            }

            let loss = squared_error / samples.len() as f64;
            if !loss.is_finite() {
                return Err(RecommendError::TrainingError(format!(
                    "loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            losses.push(loss);
        }

        Ok(losses)
    }

    fn train_batch(
        &mut self,
        samples: &[(usize, usize, f64)],
        batch: &[usize],
        params: TrainingParams,
    ) -> f64 {
        let scale = 1.0 / batch.len() as f64;
        let mut learner_grad = Gradient::default();
        let mut candidate_grad = Gradient::default();
        let mut global_grad = 0.0;
        let mut squared_error = 0.0;

        for &idx in batch {
            let (u, i, rating) = samples[idx];
            let err = self.predict(u, i) - rating;
            squared_error += err * err;

            let p_u = self.learner_factors.row(u).to_owned();
            let q_i = self.candidate_factors.row(i).to_owned();
            learner_grad.add(u, &q_i * err, err);
            candidate_grad.add(i, &p_u * err, err);
            global_grad += err;
        }

        let lr = params.learning_rate;
        let reg = params.regularization;

        for (u, grad) in learner_grad.factors {
            let mut row = self.learner_factors.row_mut(u);
            let step = &grad * scale + &row * reg;
            row.scaled_add(-lr, &step);
        }
        for (u, grad) in learner_grad.bias {
            let b = &mut self.learner_bias[u];
            *b -= lr * (grad * scale + reg * *b);
        }
        for (i, grad) in candidate_grad.factors {
            let mut row = self.candidate_factors.row_mut(i);
            let step = &grad * scale + &row * reg;
            row.scaled_add(-lr, &step);
        }
        for (i, grad) in candidate_grad.bias {
            let b = &mut self.candidate_bias[i];
            *b -= lr * (grad * scale + reg * *b);
        }
        self.global_bias -= lr * global_grad * scale;

        squared_error
    }

    /// One unregularized SGD step toward `rating` for a single pair
    pub fn online_step(&mut self, learner: usize, candidate: usize, rating: f64, lr: f64) {
        let err = rating - self.predict(learner, candidate);

        self.learner_bias[learner] += lr * err;
        self.candidate_bias[candidate] += lr * err;

        let p_u = self.learner_factors.row(learner).to_owned();
        let q_i = self.candidate_factors.row(candidate).to_owned();
        self.learner_factors
            .row_mut(learner)
            .scaled_add(lr * err, &q_i);
        self.candidate_factors
            .row_mut(candidate)
            .scaled_add(lr * err, &p_u);
    }
}
