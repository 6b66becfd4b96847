//! Reward Scoring Engine
//!
//! Pure, deterministic mapping from a contribution's review and adoption
//! signals to a T4G amount. The formula multiplies the base reward by a
//! quality multiplier and an impact multiplier, adds the pioneer bonus, and
//! floors exactly once at the end.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DistributionError, DistributionResult};
use crate::scoring::model::{Contribution, RewardRecord};

/// Expert reviews count this many times a regular review.
const EXPERT_REVIEW_WEIGHT: f64 = 3.0;

/// Field-test success rate above which the impact bonus applies.
const FIELD_TEST_SUCCESS_THRESHOLD: f64 = 0.8;

/// Economic impact equal to this many T4G units earns the full +1.0
/// impact term; smaller impacts earn a proportional share.
const ECONOMIC_IMPACT_SCALE: f64 = 10_000.0;

/// Full scoring breakdown, returned by dry-run calculation and used to
/// build the persisted `RewardRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base_reward: u64,
    /// Expert-weighted mean review score, absent with zero reviews.
    pub quality_score: Option<f64>,
    pub quality_multiplier: f64,
    pub impact_multiplier: f64,
    pub pioneer_bonus: u64,
    pub total_reward: u64,
}

impl RewardBreakdown {
    pub fn into_record(self, contribution_id: impl Into<String>) -> RewardRecord {
        RewardRecord {
            contribution_id: contribution_id.into(),
            base_reward: self.base_reward,
            quality_multiplier: self.quality_multiplier,
            impact_multiplier: self.impact_multiplier,
            pioneer_bonus: self.pioneer_bonus,
            total_reward: self.total_reward,
            distributed: false,
            distributed_at: None,
        }
    }
}

/// Compute the reward for a contribution. Pure and deterministic: the same
/// contribution state always yields the same breakdown.
pub fn compute_reward(contribution: &Contribution) -> RewardBreakdown {
    let base_reward = contribution.contribution_type.base_reward();

    let quality_score = weighted_quality_score(contribution);
    let quality_multiplier = match quality_score {
        None => 1.0,
        Some(q) => (q / 5.0 * 2.0).clamp(0.5, 2.0),
    };

    let impact_multiplier = impact_multiplier(contribution);

    // Floor exactly once, after the pioneer bonus, so intermediate
    // rounding never compounds.
    let total_reward = (base_reward as f64 * quality_multiplier * impact_multiplier
        + contribution.pioneer_bonus as f64)
        .floor() as u64;

    if impact_multiplier > 2.0 {
        debug!(
            contribution_id = %contribution.id,
            impact_multiplier,
            "Uncapped economic impact pushed the multiplier above 2.0"
        );
    }

    RewardBreakdown {
        base_reward,
        quality_score,
        quality_multiplier,
        impact_multiplier,
        pioneer_bonus: contribution.pioneer_bonus,
        total_reward,
    }
}

/// Re-score a contribution into an existing record. Forbidden once the
/// record is distributed: late reviews never change a paid-out amount.
pub fn rescore(record: &mut RewardRecord, contribution: &Contribution) -> DistributionResult<()> {
    if record.distributed {
        return Err(DistributionError::validation(format!(
            "contribution {} already distributed, record is frozen",
            record.contribution_id
        )));
    }
    let breakdown = compute_reward(contribution);
    record.base_reward = breakdown.base_reward;
    record.quality_multiplier = breakdown.quality_multiplier;
    record.impact_multiplier = breakdown.impact_multiplier;
    record.pioneer_bonus = breakdown.pioneer_bonus;
    record.total_reward = breakdown.total_reward;
    Ok(())
}

/// Weighted mean of review overall scores, with expert reviews counting 3x.
/// None when there are no reviews.
fn weighted_quality_score(contribution: &Contribution) -> Option<f64> {
    if contribution.reviews.is_empty() {
        return None;
    }
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for review in &contribution.reviews {
        let weight = if review.is_expert_review {
            EXPERT_REVIEW_WEIGHT
        } else {
            1.0
        };
        weighted_sum += weight * review.overall_score();
        weight_total += weight;
    }
    Some(weighted_sum / weight_total)
}

/// Additive impact multiplier, starting at 1.0. The economic-impact term is
/// capped at +1.0 but the sum itself is deliberately not re-clamped.
fn impact_multiplier(contribution: &Contribution) -> f64 {
    let mut multiplier = 1.0;

    if contribution.adoption.implementations > 10 {
        multiplier += 0.5;
    }
    if contribution.adoption.implementations > 50 {
        multiplier += 0.5;
    }

    if let Some(rate) = contribution.field_test_success_rate() {
        if rate > FIELD_TEST_SUCCESS_THRESHOLD {
            multiplier += 0.3;
        }
    }

    let economic_term = (contribution.adoption.economic_impact / ECONOMIC_IMPACT_SCALE).min(1.0);
    if economic_term > 0.0 {
        multiplier += economic_term;
    }

    multiplier
}
