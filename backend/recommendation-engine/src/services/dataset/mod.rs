// ============================================
// Demo Dataset Generator (示範數據)
// ============================================
//
// Seeded synthetic learners, candidates and interactions. Learners lean
// toward candidates in their own province and of the school type that fits
// their career goal, so the CF model has real structure to learn.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Candidate, InteractionRecord, InteractionType, LearnerProfile, RiskPreference};

const PROVINCES: [&str; 12] = [
    "北京", "上海", "广东", "江苏", "浙江", "山东", "四川", "湖北", "湖南", "重庆", "陕西", "辽宁",
];

/// (career goal, school type it suits, keywords for that type)
const TRACKS: [(&str, &str, [&str; 3]); 6] = [
    ("IT行业", "理工", ["计算机", "人工智能", "电子信息"]),
    ("医疗卫生", "医药", ["临床医学", "药学", "生物医学"]),
    ("金融行业", "财经", ["金融", "会计", "经济学"]),
    ("教育工作", "师范", ["教育学", "心理学", "汉语言"]),
    ("法律行业", "政法", ["法学", "政治学", "社会学"]),
    ("艺术设计", "艺术", ["设计", "美术", "音乐"]),
];

const COMPREHENSIVE_KEYWORDS: [&str; 3] = ["数学", "物理", "历史"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub learners: usize,
    pub candidates: usize,
    /// Candidates each learner interacts with
    pub interactions_per_learner: usize,
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            learners: 200,
            candidates: 60,
            interactions_per_learner: 8,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoDataset {
    pub learners: Vec<LearnerProfile>,
    pub candidates: Vec<Candidate>,
    pub interactions: Vec<InteractionRecord>,
}

impl DemoDataset {
    pub fn generate(config: &DatasetConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);

        let candidates: Vec<Candidate> = (0..config.candidates)
            .map(|i| random_candidate(i, &mut rng))
            .collect();
        let learners: Vec<LearnerProfile> = (0..config.learners)
            .map(|i| random_learner(i, &mut rng))
            .collect();

        let mut interactions = Vec::new();
        let per_learner = config.interactions_per_learner.min(candidates.len());
        for learner in &learners {
            let favoured_type = learner
                .career_goal
                .as_deref()
                .and_then(|goal| TRACKS.iter().find(|(career, _, _)| *career == goal))
                .map(|(_, school_type, _)| *school_type);

            for candidate in candidates.choose_multiple(&mut rng, per_learner) {
                let mut affinity = 0.2;
                if learner.province == candidate.province {
                    affinity += 0.35;
                }
                if Some(candidate.school_type.as_str()) == favoured_type {
                    affinity += 0.35;
                }

                let roll: f64 = rng.gen();
                let interaction_type = if roll < affinity * 0.5 {
                    InteractionType::Apply
                } else if roll < affinity {
                    InteractionType::Favorite
                } else if roll < affinity + 0.3 {
                    InteractionType::Click
                } else {
                    InteractionType::Ignore
                };

                interactions.push(InteractionRecord::new(
                    learner.id.clone(),
                    candidate.id.clone(),
                    interaction_type,
                    None,
                ));
            }
        }

        Self {
            learners,
            candidates,
            interactions,
        }
    }
}

fn random_candidate(index: usize, rng: &mut StdRng) -> Candidate {
    let province = PROVINCES[rng.gen_range(0..PROVINCES.len())];

    // One in four is a comprehensive university
    let (school_type, keywords): (&str, Vec<&str>) = if rng.gen_bool(0.25) {
        ("综合", COMPREHENSIVE_KEYWORDS.to_vec())
    } else {
        let (_, school_type, keywords) = TRACKS[rng.gen_range(0..TRACKS.len())];
        (school_type, keywords.to_vec())
    };

    Candidate {
        id: format!("school_{:03}", index),
        name: format!("{}{}大学{}", province, school_type, index),
        program: None,
        rank: Some(index as u32 + 1),
        admission_line: Some(rng.gen_range(520.0..690.0_f64).round()),
        admission_rate: Some(rng.gen_range(0.05..0.6)),
        school_type: school_type.to_string(),
        province: Some(province.to_string()),
        keywords: keywords.into_iter().map(str::to_string).collect(),
        subject_strengths: None,
    }
}

fn random_learner(index: usize, rng: &mut StdRng) -> LearnerProfile {
    let (career, _, keywords) = TRACKS[rng.gen_range(0..TRACKS.len())];
    let risk_preference = [
        RiskPreference::Conservative,
        RiskPreference::Balanced,
        RiskPreference::Aggressive,
    ][rng.gen_range(0..3)];

    let math = rng.gen_range(80.0..150.0_f64).round();
    let english = rng.gen_range(80.0..150.0_f64).round();
    let specialized = rng.gen_range(160.0..300.0_f64).round();
    let chinese = rng.gen_range(90.0..140.0_f64).round();

    LearnerProfile {
        id: format!("learner_{:04}", index),
        total_score: math + english + specialized + chinese,
        subject_scores: HashMap::from([
            ("math".to_string(), math),
            ("english".to_string(), english),
            ("specialized".to_string(), specialized),
        ]),
        province: Some(PROVINCES[rng.gen_range(0..PROVINCES.len())].to_string()),
        risk_preference,
        interests: keywords
            .choose_multiple(rng, 2)
            .map(|k| k.to_string())
            .collect(),
        career_goal: Some(career.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> DatasetConfig {
        DatasetConfig {
            learners: 20,
            candidates: 10,
            interactions_per_learner: 4,
            seed: 5,
        }
    }

    #[test]
    fn test_sizes() {
        let dataset = DemoDataset::generate(&small());
        assert_eq!(dataset.learners.len(), 20);
        assert_eq!(dataset.candidates.len(), 10);
        assert_eq!(dataset.interactions.len(), 80);
    }

    #[test]
    fn test_records_are_valid() {
        let dataset = DemoDataset::generate(&small());
        assert!(dataset.learners.iter().all(|l| l.validate().is_ok()));
        assert!(dataset.candidates.iter().all(|c| c.validate().is_ok()));

        let ids: std::collections::HashSet<&str> =
            dataset.candidates.iter().map(|c| c.id.as_str()).collect();
        assert!(dataset
            .interactions
            .iter()
            .all(|r| ids.contains(r.candidate_id.as_str()) && (0.0..=1.0).contains(&r.rating)));
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = DemoDataset::generate(&small());
        let b = DemoDataset::generate(&small());

        let pairs = |d: &DemoDataset| -> Vec<(String, String, f64)> {
            d.interactions
                .iter()
                .map(|r| (r.learner_id.clone(), r.candidate_id.clone(), r.rating))
                .collect()
        };
        assert_eq!(pairs(&a), pairs(&b));
        assert_eq!(a.learners[3].total_score, b.learners[3].total_score);
    }
}
