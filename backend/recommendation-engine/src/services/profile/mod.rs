// ============================================
// Profile Vectorizer (學生畫像向量化)
// ============================================
//
// Turns a learner profile into a fixed-length numeric vector.
//
// Layout:
//   [numeric scores (4), provinces (10 + other), risk preference (3),
//    interest embedding (d), career embedding (d)]
//
// Numeric scores are z-score normalized with parameters fitted over a
// reference population. Until `fit_normalizer` has run, raw values pass
// through unchanged.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::error::{RecommendError, Result};
use crate::models::{LearnerProfile, RiskPreference};
use crate::utils::mean_std;

/// Provinces with a dedicated one-hot slot
pub const PROVINCES: [&str; 10] = [
    "北京", "上海", "广东", "江苏", "浙江", "山东", "四川", "湖北", "湖南", "河北",
];

/// Subject scores picked from `LearnerProfile::subject_scores`
pub const SUBJECTS: [&str; 3] = ["math", "english", "specialized"];

const TOTAL_SCORE: &str = "total_score";

const RISK_PREFERENCES: [RiskPreference; 3] = [
    RiskPreference::Conservative,
    RiskPreference::Balanced,
    RiskPreference::Aggressive,
];

/// Fitted z-score parameters, keyed by feature name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizerParams {
    pub means: BTreeMap<String, f64>,
    pub stds: BTreeMap<String, f64>,
}

/// Index ranges of each block in a profile vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorLayout {
    /// total_score, then SUBJECTS
    pub numeric: Range<usize>,
    /// PROVINCES, then the "other" slot
    pub provinces: Range<usize>,
    pub risk: Range<usize>,
    pub interest: Range<usize>,
    pub career: Range<usize>,
}

impl VectorLayout {
    pub fn new(embedding_dim: usize) -> Self {
        let numeric = 0..1 + SUBJECTS.len();
        let provinces = numeric.end..numeric.end + PROVINCES.len() + 1;
        let risk = provinces.end..provinces.end + RISK_PREFERENCES.len();
        let interest = risk.end..risk.end + embedding_dim;
        let career = interest.end..interest.end + embedding_dim;

        Self {
            numeric,
            provinces,
            risk,
            interest,
            career,
        }
    }

    pub fn dimension(&self) -> usize {
        self.career.end
    }

    /// Subject score slots, without the total
    pub fn subjects(&self) -> Range<usize> {
        self.numeric.start + 1..self.numeric.end
    }
}

pub struct ProfileVectorizer {
    embedding_dim: usize,
    normalizer: Option<NormalizerParams>,
    unfitted_reported: AtomicBool,
}

impl ProfileVectorizer {
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            normalizer: None,
            unfitted_reported: AtomicBool::new(false),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.normalizer.is_some()
    }

    pub fn normalizer(&self) -> Option<&NormalizerParams> {
        self.normalizer.as_ref()
    }

    /// Fit means and standard deviations over a reference population
    pub fn fit_normalizer(&mut self, population: &[LearnerProfile]) -> Result<()> {
        if population.is_empty() {
            return Err(RecommendError::ConfigError(
                "cannot fit normalizer on an empty population".to_string(),
            ));
        }

        let mut params = NormalizerParams::default();
        for feature in numeric_feature_names() {
            let values: Vec<f64> = population
                .iter()
                .map(|learner| numeric_value(learner, feature))
                .collect();
            let (mean, std) = mean_std(&values);
            params.means.insert(feature.to_string(), mean);
            params.stds.insert(feature.to_string(), std);
        }

        info!(
            population = population.len(),
            total_mean = params.means.get(TOTAL_SCORE).copied().unwrap_or_default(),
            "Profile normalizer fitted"
        );

        self.normalizer = Some(params);
        Ok(())
    }

    /// Length of every vector produced by `vectorize`
    pub fn dimension(&self) -> usize {
        self.layout().dimension()
    }

    pub fn layout(&self) -> VectorLayout {
        VectorLayout::new(self.embedding_dim)
    }

    /// Feature names in vector order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = numeric_feature_names().map(str::to_string).collect();
        names.extend(PROVINCES.iter().map(|p| format!("province_{}", p)));
        names.push("province_other".to_string());
        names.extend(
            RISK_PREFERENCES
                .iter()
                .map(|r| format!("risk_{}", r.as_str())),
        );
        names.extend((0..self.embedding_dim).map(|i| format!("interest_vec_{}", i)));
        names.extend((0..self.embedding_dim).map(|i| format!("career_vec_{}", i)));
        names
    }

    pub fn vectorize(&self, learner: &LearnerProfile) -> Result<Array1<f64>> {
        let mut features = Vec::with_capacity(self.dimension());

        for feature in numeric_feature_names() {
            features.push(self.normalize(numeric_value(learner, feature), feature));
        }

        let province = learner.province.as_deref().unwrap_or("");
        features.extend(
            PROVINCES
                .iter()
                .map(|p| if *p == province { 1.0 } else { 0.0 }),
        );
        let is_other = !province.is_empty() && !PROVINCES.contains(&province);
        features.push(if is_other { 1.0 } else { 0.0 });

        features.extend(RISK_PREFERENCES.iter().map(|r| {
            if *r == learner.risk_preference {
                1.0
            } else {
                0.0
            }
        }));

        self.push_embedding(&mut features, &learner.id, "interest", &learner.interest_embedding)?;
        self.push_embedding(&mut features, &learner.id, "career", &learner.career_embedding)?;

        Ok(Array1::from(features))
    }

    fn normalize(&self, value: f64, feature: &str) -> f64 {
        let Some(params) = &self.normalizer else {
            if !self.unfitted_reported.swap(true, Ordering::Relaxed) {
                warn!(
                    error = %RecommendError::ConfigError("profile normalizer was never fitted".to_string()),
                    "Falling back to raw numeric features"
                );
            }
            return value;
        };

        match (params.means.get(feature), params.stds.get(feature)) {
            (Some(_), Some(std)) if *std <= f64::EPSILON => 0.0,
            (Some(mean), Some(std)) => (value - mean) / std,
            _ => value,
        }
    }

    fn push_embedding(
        &self,
        features: &mut Vec<f64>,
        learner_id: &str,
        name: &str,
        embedding: &Option<Vec<f64>>,
    ) -> Result<()> {
        match embedding {
            Some(values) if values.len() != self.embedding_dim => {
                Err(RecommendError::InputError(format!(
                    "learner {} {} embedding has length {}, expected {}",
                    learner_id,
                    name,
                    values.len(),
                    self.embedding_dim
                )))
            }
            Some(values) => {
                features.extend_from_slice(values);
                Ok(())
            }
            None => {
                features.extend(std::iter::repeat(0.0).take(self.embedding_dim));
                Ok(())
            }
        }
    }
}

fn numeric_feature_names() -> impl Iterator<Item = &'static str> {
    std::iter::once(TOTAL_SCORE).chain(SUBJECTS.iter().copied())
}

fn numeric_value(learner: &LearnerProfile, feature: &str) -> f64 {
    if feature == TOTAL_SCORE {
        learner.total_score
    } else {
        learner.subject_score(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn learner(id: &str, total: f64, math: f64, province: &str) -> LearnerProfile {
        LearnerProfile {
            id: id.to_string(),
            total_score: total,
            subject_scores: HashMap::from([("math".to_string(), math)]),
            province: Some(province.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_dimension_matches_feature_names() {
        let vectorizer = ProfileVectorizer::new(4);
        assert_eq!(vectorizer.dimension(), 4 + 11 + 3 + 8);
        assert_eq!(vectorizer.feature_names().len(), vectorizer.dimension());
    }

    #[test]
    fn test_layout_blocks() {
        let layout = ProfileVectorizer::new(2).layout();
        assert_eq!(layout.subjects(), 1..4);
        assert_eq!(layout.provinces, 4..15);
        assert_eq!(layout.risk, 15..18);
        assert_eq!(layout.interest, 18..20);
        assert_eq!(layout.career, 20..22);
        assert_eq!(layout.dimension(), 22);
    }

    #[test]
    fn test_unfitted_passes_raw_values() {
        let vectorizer = ProfileVectorizer::new(0);
        let vector = vectorizer.vectorize(&learner("u1", 640.0, 120.0, "北京")).unwrap();

        assert_eq!(vector[0], 640.0);
        assert_eq!(vector[1], 120.0);
        assert_eq!(vector[2], 0.0); // english missing
    }

    #[test]
    fn test_fitted_z_scores() {
        let mut vectorizer = ProfileVectorizer::new(0);
        let population = vec![
            learner("a", 500.0, 100.0, "北京"),
            learner("b", 600.0, 100.0, "上海"),
            learner("c", 700.0, 100.0, "广东"),
        ];
        vectorizer.fit_normalizer(&population).unwrap();

        let vector = vectorizer.vectorize(&learner("u", 700.0, 130.0, "北京")).unwrap();
        assert!((vector[0] - 1.0).abs() < 1e-9); // (700 - 600) / 100
        assert_eq!(vector[1], 0.0); // math std is zero
    }

    #[test]
    fn test_fit_on_empty_population_fails() {
        let mut vectorizer = ProfileVectorizer::new(0);
        assert!(matches!(
            vectorizer.fit_normalizer(&[]),
            Err(RecommendError::ConfigError(_))
        ));
        assert!(!vectorizer.is_fitted());
    }

    #[test]
    fn test_province_one_hot() {
        let vectorizer = ProfileVectorizer::new(0);
        let offset = 1 + SUBJECTS.len();

        let known = vectorizer.vectorize(&learner("u", 600.0, 0.0, "上海")).unwrap();
        assert_eq!(known[offset + 1], 1.0);
        assert_eq!(known[offset + PROVINCES.len()], 0.0);

        let other = vectorizer.vectorize(&learner("u", 600.0, 0.0, "重庆")).unwrap();
        assert_eq!(other[offset + PROVINCES.len()], 1.0);
        let slots = other.slice(ndarray::s![offset..offset + PROVINCES.len()]);
        assert_eq!(slots.sum(), 0.0);

        let mut unknown = learner("u", 600.0, 0.0, "");
        unknown.province = None;
        let none = vectorizer.vectorize(&unknown).unwrap();
        assert_eq!(none.slice(ndarray::s![offset..offset + PROVINCES.len() + 1]).sum(), 0.0);
    }

    #[test]
    fn test_risk_preference_one_hot() {
        let vectorizer = ProfileVectorizer::new(0);
        let mut profile = learner("u", 600.0, 0.0, "北京");
        profile.risk_preference = RiskPreference::Aggressive;

        let vector = vectorizer.vectorize(&profile).unwrap();
        let offset = 1 + SUBJECTS.len() + PROVINCES.len() + 1;
        assert_eq!(vector[offset], 0.0);
        assert_eq!(vector[offset + 1], 0.0);
        assert_eq!(vector[offset + 2], 1.0);
    }

    #[test]
    fn test_embeddings_appended_or_zero_filled() {
        let vectorizer = ProfileVectorizer::new(2);
        let mut profile = learner("u", 600.0, 0.0, "北京");
        profile.interest_embedding = Some(vec![0.3, -0.4]);

        let vector = vectorizer.vectorize(&profile).unwrap();
        let n = vector.len();
        assert_eq!(vector[n - 4], 0.3);
        assert_eq!(vector[n - 3], -0.4);
        assert_eq!(vector[n - 2], 0.0);
        assert_eq!(vector[n - 1], 0.0);
    }

    #[test]
    fn test_wrong_embedding_length_is_input_error() {
        let vectorizer = ProfileVectorizer::new(3);
        let mut profile = learner("u", 600.0, 0.0, "北京");
        profile.career_embedding = Some(vec![1.0]);

        assert!(matches!(
            vectorizer.vectorize(&profile),
            Err(RecommendError::InputError(_))
        ));
    }
}
