//! Contribution Data Model
//!
//! A contribution is the unit of rewarded work: authored once, then mutated
//! by reviewers and field testers until its reward is distributed, after
//! which its reward record is frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DistributionError, DistributionResult};

/// Kind of community contribution. Determines the base reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionType {
    Guide,
    Tutorial,
    Troubleshooting,
    Analysis,
    Script,
    Security,
    Translation,
    Review,
    /// Unknown/unmapped kinds fall back to a neutral base reward.
    Other,
}

impl ContributionType {
    /// Base reward in T4G units, before multipliers.
    pub fn base_reward(&self) -> u64 {
        match self {
            ContributionType::Guide => 200,
            ContributionType::Tutorial => 150,
            ContributionType::Troubleshooting => 80,
            ContributionType::Analysis => 120,
            ContributionType::Script => 100,
            ContributionType::Security => 180,
            ContributionType::Translation => 60,
            ContributionType::Review => 25,
            ContributionType::Other => 100,
        }
    }
}

/// The five 1-5 sub-scores of a peer review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReviewScores {
    pub accuracy: u8,
    pub clarity: u8,
    pub completeness: u8,
    pub usefulness: u8,
    pub reproducibility: u8,
}

impl ReviewScores {
    pub fn mean(&self) -> f64 {
        (self.accuracy as f64
            + self.clarity as f64
            + self.completeness as f64
            + self.usefulness as f64
            + self.reproducibility as f64)
            / 5.0
    }
}

/// A single peer review. One per reviewer per contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerReview {
    pub reviewer_id: String,
    pub scores: ReviewScores,
    /// Reviews from domain-verified experts count 3x in scoring.
    pub is_expert_review: bool,
    pub created_at: DateTime<Utc>,
}

impl PeerReview {
    pub fn new(reviewer_id: impl Into<String>, scores: ReviewScores, is_expert_review: bool) -> Self {
        Self {
            reviewer_id: reviewer_id.into(),
            scores,
            is_expert_review,
            created_at: Utc::now(),
        }
    }

    /// Arithmetic mean of the five sub-scores.
    pub fn overall_score(&self) -> f64 {
        self.scores.mean()
    }
}

/// A before/after measurement attached to a field test.
///
/// Known metric shapes are tagged; anything else lands in `Unrecognized`
/// so scoring stays exhaustive without dropping submitter data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricValue {
    DurationSeconds { value: f64 },
    CostUnits { value: f64 },
    Throughput { value: f64 },
    Score { value: f64 },
    Unrecognized { name: String, value: serde_json::Value },
}

/// Real-world trial of a contribution. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTest {
    pub tester_id: String,
    pub before: MetricValue,
    pub after: MetricValue,
    pub success: bool,
    pub improvement_pct: f64,
    pub tested_at: DateTime<Utc>,
}

/// Adoption counters, maintained by the content source and echoed back in
/// scoring breakdowns. Only `implementations` and `economic_impact` feed the
/// impact multiplier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdoptionMetrics {
    pub views: u64,
    pub implementations: u64,
    /// Upstream's own success-rate figure, 0.0 - 1.0. Scoring ignores it
    /// and derives the rate from the attached field tests instead
    /// ([`Contribution::field_test_success_rate`]), since those carry the
    /// per-test evidence this engine can audit.
    pub success_rate: f64,
    /// Measured economic impact in T4G-equivalent units.
    pub economic_impact: f64,
}

/// A contribution with its review/adoption signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub author_id: String,
    pub contribution_type: ContributionType,
    pub domain: String,
    pub reviews: Vec<PeerReview>,
    pub field_tests: Vec<FieldTest>,
    pub adoption: AdoptionMetrics,
    /// Flat first-of-kind bonus, computed externally. Default 0.
    #[serde(default)]
    pub pioneer_bonus: u64,
}

impl Contribution {
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        contribution_type: ContributionType,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            contribution_type,
            domain: domain.into(),
            reviews: Vec::new(),
            field_tests: Vec::new(),
            adoption: AdoptionMetrics::default(),
            pioneer_bonus: 0,
        }
    }

    /// Attach a peer review, enforcing one review per reviewer.
    pub fn add_review(&mut self, review: PeerReview) -> DistributionResult<()> {
        if self
            .reviews
            .iter()
            .any(|r| r.reviewer_id == review.reviewer_id)
        {
            return Err(DistributionError::validation(format!(
                "reviewer {} already reviewed contribution {}",
                review.reviewer_id, self.id
            )));
        }
        self.reviews.push(review);
        Ok(())
    }

    /// Field tests are append-only; repeat testers are allowed.
    pub fn add_field_test(&mut self, test: FieldTest) {
        self.field_tests.push(test);
    }

    /// Fraction of field tests marked successful, or None with no tests.
    pub fn field_test_success_rate(&self) -> Option<f64> {
        if self.field_tests.is_empty() {
            return None;
        }
        let successes = self.field_tests.iter().filter(|t| t.success).count();
        Some(successes as f64 / self.field_tests.len() as f64)
    }
}

/// Per-contribution reward record.
///
/// `distributed` transitions false -> true exactly once; the amounts are
/// frozen from that point on, even if late reviews arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRecord {
    pub contribution_id: String,
    pub base_reward: u64,
    pub quality_multiplier: f64,
    pub impact_multiplier: f64,
    pub pioneer_bonus: u64,
    pub total_reward: u64,
    pub distributed: bool,
    pub distributed_at: Option<DateTime<Utc>>,
}

impl RewardRecord {
    /// Mark the record distributed. Fails if it already is.
    pub fn mark_distributed(&mut self) -> DistributionResult<()> {
        if self.distributed {
            return Err(DistributionError::validation(format!(
                "reward for contribution {} already distributed",
                self.contribution_id
            )));
        }
        self.distributed = true;
        self.distributed_at = Some(Utc::now());
        Ok(())
    }
}
