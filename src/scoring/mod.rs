//! Contribution scoring: data model plus the pure reward formula.

pub mod engine;
pub mod model;

pub use engine::{compute_reward, rescore, RewardBreakdown};
pub use model::{
    AdoptionMetrics, Contribution, ContributionType, FieldTest, MetricValue, PeerReview,
    RewardRecord, ReviewScores,
};
