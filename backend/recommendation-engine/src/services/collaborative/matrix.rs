use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse learner × candidate rating matrix.
///
/// Stored twice (by row and by column) so both a learner's history and a
/// candidate's rating vector are cheap to walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionMatrix {
    rows: Vec<BTreeMap<usize, f64>>,
    cols: Vec<BTreeMap<usize, f64>>,
}

impl InteractionMatrix {
    pub fn new(n_learners: usize, n_candidates: usize) -> Self {
        Self {
            rows: vec![BTreeMap::new(); n_learners],
            cols: vec![BTreeMap::new(); n_candidates],
        }
    }

    pub fn n_candidates(&self) -> usize {
        self.cols.len()
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(BTreeMap::len).sum()
    }

    /// Store a rating, overwriting any earlier one for the same pair
    pub fn set(&mut self, learner: usize, candidate: usize, rating: f64) {
        self.rows[learner].insert(candidate, rating);
        self.cols[candidate].insert(learner, rating);
    }

    pub fn get(&self, learner: usize, candidate: usize) -> Option<f64> {
        self.rows.get(learner)?.get(&candidate).copied()
    }

    /// Ratings given by one learner, keyed by candidate index
    pub fn row(&self, learner: usize) -> &BTreeMap<usize, f64> {
        &self.rows[learner]
    }

    /// All stored (learner, candidate, rating) triples in row order
    pub fn entries(&self) -> Vec<(usize, usize, f64)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(u, row)| row.iter().map(move |(i, r)| (u, *i, *r)))
            .collect()
    }

    fn column_norm(&self, candidate: usize) -> f64 {
        self.cols[candidate]
            .values()
            .map(|r| r * r)
            .sum::<f64>()
            .sqrt()
    }

    fn column_dot(&self, a: usize, b: usize) -> f64 {
        let (small, large) = if self.cols[a].len() <= self.cols[b].len() {
            (&self.cols[a], &self.cols[b])
        } else {
            (&self.cols[b], &self.cols[a])
        };

        small
            .iter()
            .filter_map(|(learner, r)| large.get(learner).map(|other| r * other))
            .sum()
    }

    /// Cosine similarity of two candidates' rating columns
    pub fn cosine(&self, a: usize, b: usize) -> f64 {
        let denom = self.column_norm(a) * self.column_norm(b);
        if denom <= f64::EPSILON {
            0.0
        } else {
            self.column_dot(a, b) / denom
        }
    }

    /// Similarities of one candidate against every candidate (itself included)
    pub fn similarity_row(&self, candidate: usize) -> Vec<f64> {
        let norm = self.column_norm(candidate);
        let norms: Vec<f64> = (0..self.n_candidates()).map(|j| self.column_norm(j)).collect();

        (0..self.n_candidates())
            .map(|j| {
                let denom = norm * norms[j];
                if denom <= f64::EPSILON {
                    0.0
                } else {
                    self.column_dot(candidate, j) / denom
                }
            })
            .collect()
    }

    /// Full candidate × candidate cosine similarity matrix
    pub fn similarity_matrix(&self) -> Array2<f64> {
        let n = self.n_candidates();
        let norms: Vec<f64> = (0..n).map(|j| self.column_norm(j)).collect();
        let mut similarity = Array2::<f64>::zeros((n, n));

        for i in 0..n {
            if norms[i] <= f64::EPSILON {
                continue;
            }
            similarity[[i, i]] = 1.0;
            for j in (i + 1)..n {
                let denom = norms[i] * norms[j];
                if denom <= f64::EPSILON {
                    continue;
                }
                let sim = self.column_dot(i, j) / denom;
                similarity[[i, j]] = sim;
                similarity[[j, i]] = sim;
            }
        }

        similarity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InteractionMatrix {
        // learners 0..3, candidates 0..3
        let mut m = InteractionMatrix::new(3, 3);
        m.set(0, 0, 1.0);
        m.set(0, 1, 1.0);
        m.set(1, 0, 1.0);
        m.set(1, 1, 0.5);
        m.set(2, 2, 1.0);
        m
    }

    #[test]
    fn test_set_overwrites() {
        let mut m = sample();
        assert_eq!(m.nnz(), 5);
        m.set(0, 0, 0.5);
        assert_eq!(m.nnz(), 5);
        assert_eq!(m.get(0, 0), Some(0.5));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn test_cosine() {
        let m = sample();
        // col0 = [1, 1, 0], col1 = [1, 0.5, 0]
        let expected = 1.5 / (2f64.sqrt() * 1.25f64.sqrt());
        assert!((m.cosine(0, 1) - expected).abs() < 1e-9);
        assert_eq!(m.cosine(0, 2), 0.0);
    }

    #[test]
    fn test_similarity_matrix_symmetric() {
        let m = sample();
        let sim = m.similarity_matrix();
        assert_eq!(sim.dim(), (3, 3));
        assert!((sim[[0, 1]] - sim[[1, 0]]).abs() < 1e-12);
        assert_eq!(sim[[0, 0]], 1.0);
        assert_eq!(sim[[2, 0]], 0.0);
    }

    #[test]
    fn test_similarity_row_matches_matrix() {
        let m = sample();
        let sim = m.similarity_matrix();
        let row = m.similarity_row(0);
        for (j, value) in row.iter().enumerate() {
            assert!((value - sim[[0, j]]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_entries_in_row_order() {
        let m = sample();
        let entries = m.entries();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0], (0, 0, 1.0));
        assert_eq!(entries[4], (2, 2, 1.0));
    }
}
