use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::utils::desc_by_score;

/// Top-k most similar candidates per candidate.
///
/// Neighbours with zero similarity are not kept, and a candidate is never
/// its own neighbour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnIndex {
    k: usize,
    neighbors: Vec<Vec<(usize, f64)>>,
}

impl KnnIndex {
    pub fn build(similarity: &Array2<f64>, k: usize) -> Self {
        let n = similarity.nrows();
        let neighbors = (0..n).map(|i| top_k(similarity, i, k)).collect();
        Self { k, neighbors }
    }

    pub fn neighbors(&self, candidate: usize) -> &[(usize, f64)] {
        self.neighbors
            .get(candidate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rebuild the lists touched by a change to `candidate`'s similarity row.
    ///
    /// The candidate's own list is always rebuilt. Another list is rebuilt
    /// when it currently contains the candidate, or when the new similarity
    /// would now qualify for it.
    pub fn refresh(&mut self, similarity: &Array2<f64>, candidate: usize) -> usize {
        let mut rebuilt = 1;
        self.neighbors[candidate] = top_k(similarity, candidate, self.k);

        for j in 0..self.neighbors.len() {
            if j == candidate {
                continue;
            }

            let sim = similarity[[j, candidate]];
            let list = &self.neighbors[j];
            let contains = list.iter().any(|(idx, _)| *idx == candidate);
            let qualifies = sim > 0.0
                && (list.len() < self.k || list.last().map_or(true, |(_, worst)| sim > *worst));

            if contains || qualifies {
                self.neighbors[j] = top_k(similarity, j, self.k);
                rebuilt += 1;
            }
        }

        rebuilt
    }
}

fn top_k(similarity: &Array2<f64>, candidate: usize, k: usize) -> Vec<(usize, f64)> {
    let mut row: Vec<(usize, f64)> = similarity
        .row(candidate)
        .iter()
        .enumerate()
        .filter(|(j, sim)| *j != candidate && **sim > 0.0)
        .map(|(j, sim)| (j, *sim))
        .collect();

    row.sort_by(|a, b| desc_by_score(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
    row.truncate(k);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn similarity() -> Array2<f64> {
        array![
            [1.0, 0.9, 0.2, 0.0],
            [0.9, 1.0, 0.5, 0.0],
            [0.2, 0.5, 1.0, 0.3],
            [0.0, 0.0, 0.3, 1.0],
        ]
    }

    #[test]
    fn test_build_excludes_self_and_zero() {
        let index = KnnIndex::build(&similarity(), 2);

        assert_eq!(index.neighbors(0), &[(1, 0.9), (2, 0.2)]);
        assert_eq!(index.neighbors(3), &[(2, 0.3)]);
        assert!(index.neighbors(9).is_empty());
    }

    #[test]
    fn test_refresh_picks_up_new_neighbor() {
        let mut sim = similarity();
        let mut index = KnnIndex::build(&sim, 1);
        assert_eq!(index.neighbors(3), &[(2, 0.3)]);

        sim[[0, 3]] = 0.8;
        sim[[3, 0]] = 0.8;
        index.refresh(&sim, 0);

        assert_eq!(index.neighbors(3), &[(0, 0.8)]);
        assert_eq!(index.neighbors(0), &[(1, 0.9)]);
    }

    #[test]
    fn test_refresh_drops_vanished_neighbor() {
        let mut sim = similarity();
        let mut index = KnnIndex::build(&sim, 2);

        sim[[1, 2]] = 0.0;
        sim[[2, 1]] = 0.0;
        index.refresh(&sim, 1);

        assert_eq!(index.neighbors(2), &[(3, 0.3), (0, 0.2)]);
    }
}
