// ============================================
// Content-Based Scorer (內容匹配)
// ============================================
//
// Rule-based match between a learner and a candidate on three axes:
// 1. Interest keywords vs candidate strengths (or an external text similarity)
// 2. Province / macro-region proximity
// 3. Career goal vs school type
//
// final = 0.5 * interest + 0.3 * location + 0.2 * career

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{clamp_unit, Candidate, LearnerProfile, SignalScore, SignalSource};
use crate::services::signals::{SignalOutcome, SignalProvider, SignalRequest};

const INTEREST_WEIGHT: f64 = 0.5;
const LOCATION_WEIGHT: f64 = 0.3;
const CAREER_WEIGHT: f64 = 0.2;

const NEUTRAL: f64 = 0.5;
const COMPREHENSIVE: &str = "综合";

/// Macro-regions used for the "nearby province" match
const REGIONS: [(&str, &[&str]); 7] = [
    ("北方", &["北京", "天津", "河北", "山西", "内蒙古"]),
    ("东部", &["上海", "江苏", "浙江", "安徽", "福建", "江西", "山东"]),
    ("南方", &["广东", "广西", "海南"]),
    ("中部", &["河南", "湖北", "湖南"]),
    ("西南", &["重庆", "四川", "贵州", "云南", "西藏"]),
    ("西北", &["陕西", "甘肃", "青海", "宁夏", "新疆"]),
    ("东北", &["辽宁", "吉林", "黑龙江"]),
];

/// Career goal → school types that suit it
const CAREER_SCHOOL_TYPES: [(&str, &[&str]); 6] = [
    ("IT行业", &["理工", COMPREHENSIVE]),
    ("医疗卫生", &["医药", COMPREHENSIVE]),
    ("金融行业", &["财经", COMPREHENSIVE]),
    ("教育工作", &["师范", COMPREHENSIVE]),
    ("法律行业", &["政法", COMPREHENSIVE]),
    ("艺术设计", &["艺术", COMPREHENSIVE]),
];

/// Per-axis breakdown of a content match
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContentMatch {
    pub interest: f64,
    pub location: f64,
    pub career: f64,
    pub total: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContentBasedScorer;

impl ContentBasedScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn match_score(&self, learner: &LearnerProfile, candidate: &Candidate) -> f64 {
        self.breakdown(learner, candidate).total
    }

    pub fn breakdown(&self, learner: &LearnerProfile, candidate: &Candidate) -> ContentMatch {
        let interest = interest_match(learner, candidate);
        let location = location_match(learner.province.as_deref(), candidate.province.as_deref());
        let career = career_match(learner.career_goal.as_deref(), &candidate.school_type);

        ContentMatch {
            interest,
            location,
            career,
            total: clamp_unit(
                INTEREST_WEIGHT * interest + LOCATION_WEIGHT * location + CAREER_WEIGHT * career,
            ),
        }
    }
}

#[async_trait]
impl SignalProvider for ContentBasedScorer {
    async fn score(&self, request: &SignalRequest) -> SignalOutcome {
        if request.candidates.is_empty() {
            return SignalOutcome::Empty("empty candidate pool".to_string());
        }

        let scores = request
            .candidates
            .iter()
            .map(|candidate| {
                SignalScore::new(
                    candidate.id.clone(),
                    SignalSource::ContentBased,
                    self.match_score(&request.learner, candidate),
                )
            })
            .collect();

        SignalOutcome::Scores(scores)
    }

    fn source(&self) -> SignalSource {
        SignalSource::ContentBased
    }
}

/// 0.5 + 0.5 * ratio, where ratio is the share of interests found among the
/// candidate's keywords, or the external similarity when one is supplied
fn interest_match(learner: &LearnerProfile, candidate: &Candidate) -> f64 {
    if let Some(similarity) = learner.interest_similarity.get(&candidate.id) {
        return NEUTRAL + 0.5 * clamp_unit(*similarity);
    }

    if learner.interests.is_empty() || candidate.keywords.is_empty() {
        return NEUTRAL;
    }

    let keywords: Vec<String> = candidate.keywords.iter().map(|k| k.to_lowercase()).collect();
    let matches = learner
        .interests
        .iter()
        .map(|interest| interest.to_lowercase())
        .filter(|interest| {
            keywords
                .iter()
                .any(|keyword| keyword.contains(interest.as_str()) || interest.contains(keyword.as_str()))
        })
        .count();

    let ratio = (matches as f64 / learner.interests.len() as f64).min(1.0);
    NEUTRAL + 0.5 * ratio
}

fn region_of(province: &str) -> Option<&'static str> {
    REGIONS
        .iter()
        .find(|(_, provinces)| provinces.contains(&province))
        .map(|(region, _)| *region)
}

fn location_match(learner_province: Option<&str>, candidate_province: Option<&str>) -> f64 {
    let (Some(learner), Some(candidate)) = (learner_province, candidate_province) else {
        return NEUTRAL;
    };
    if learner.is_empty() || candidate.is_empty() {
        return NEUTRAL;
    }

    if learner == candidate {
        return 1.0;
    }

    match (region_of(learner), region_of(candidate)) {
        (Some(a), Some(b)) if a == b => 0.8,
        _ => NEUTRAL,
    }
}

fn career_match(career_goal: Option<&str>, school_type: &str) -> f64 {
    let Some(goal) = career_goal.filter(|g| !g.is_empty()) else {
        return NEUTRAL;
    };

    let favoured = CAREER_SCHOOL_TYPES
        .iter()
        .find(|(career, _)| *career == goal)
        .map_or(false, |(_, types)| types.contains(&school_type));

    if favoured {
        0.9
    } else if school_type == COMPREHENSIVE {
        0.7
    } else {
        NEUTRAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learner() -> LearnerProfile {
        LearnerProfile {
            id: "u1".to_string(),
            total_score: 620.0,
            province: Some("重庆".to_string()),
            interests: vec!["计算机".to_string(), "AI".to_string()],
            career_goal: Some("IT行业".to_string()),
            ..Default::default()
        }
    }

    fn candidate(province: &str, school_type: &str, keywords: &[&str]) -> Candidate {
        Candidate {
            id: "c1".to_string(),
            name: "Test University".to_string(),
            school_type: school_type.to_string(),
            province: Some(province.to_string()),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_interest_ratio() {
        // "计算机" is a substring of "计算机科学", "ai" matches nothing
        let c = candidate("四川", "理工", &["计算机科学", "机械"]);
        assert!((interest_match(&learner(), &c) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_interest_case_insensitive_and_reverse_substring() {
        let mut l = learner();
        l.interests = vec!["Artificial Intelligence".to_string()];
        let c = candidate("四川", "理工", &["intelligence"]);
        assert!((interest_match(&l, &c) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_interest_neutral_without_data() {
        let mut l = learner();
        l.interests.clear();
        assert_eq!(interest_match(&l, &candidate("四川", "理工", &["计算机"])), 0.5);
        assert_eq!(interest_match(&learner(), &candidate("四川", "理工", &[])), 0.5);
    }

    #[test]
    fn test_external_similarity_overrides_keywords() {
        let mut l = learner();
        l.interest_similarity.insert("c1".to_string(), 0.4);
        let c = candidate("四川", "理工", &["计算机"]);
        assert!((interest_match(&l, &c) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_location_match() {
        assert_eq!(location_match(Some("重庆"), Some("重庆")), 1.0);
        assert_eq!(location_match(Some("重庆"), Some("四川")), 0.8);
        assert_eq!(location_match(Some("重庆"), Some("北京")), 0.5);
        assert_eq!(location_match(None, Some("北京")), 0.5);
        assert_eq!(location_match(Some("火星"), Some("北京")), 0.5);
    }

    #[test]
    fn test_career_match() {
        assert_eq!(career_match(Some("IT行业"), "理工"), 0.9);
        assert_eq!(career_match(Some("IT行业"), "综合"), 0.9);
        assert_eq!(career_match(Some("医疗卫生"), "理工"), 0.5);
        assert_eq!(career_match(Some("宇航员"), "综合"), 0.7);
        assert_eq!(career_match(None, "理工"), 0.5);
    }

    #[test]
    fn test_weighted_total() {
        let scorer = ContentBasedScorer::new();
        let c = candidate("四川", "理工", &["计算机科学"]);
        let m = scorer.breakdown(&learner(), &c);

        let expected = 0.5 * 0.75 + 0.3 * 0.8 + 0.2 * 0.9;
        assert!((m.total - expected).abs() < 1e-9);
        assert!((scorer.match_score(&learner(), &c) - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_provider_scores_every_candidate() {
        let request = SignalRequest {
            learner: learner(),
            candidates: vec![candidate("四川", "理工", &[]), candidate("北京", "综合", &[])],
            advisory: Vec::new(),
            profile_vector: None,
        };

        let outcome = ContentBasedScorer::new().score(&request).await;
        let scores = outcome.scores();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| s.source == SignalSource::ContentBased));
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.score)));
    }
}
