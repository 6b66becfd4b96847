//! T4G reward computation and distribution engine
//!
//! Scores community contributions into T4G token rewards, screens payouts
//! through a fraud gate, submits transfers to the token ledger, and tracks
//! each transaction from `pending` to exactly one terminal state.
//!
//! Module map:
//! - [`scoring`] - contribution model and the pure reward formula
//! - [`fraud`] - velocity tracking and risk assessment
//! - [`ledger`] - token ledger abstraction and the dev in-memory ledger
//! - [`distribution`] - payout transactions and the distributor
//! - [`stats`] - two-tier read-through cache over reward statistics
//! - [`orchestrator`] - ties scoring, gating and payout together
//! - [`database`] - transaction persistence (in-memory and PostgreSQL)
//! - [`api`] - axum HTTP surface and middleware
//! - [`config`] - engine configuration

pub mod api;
pub mod config;
pub mod database;
pub mod distribution;
pub mod error;
pub mod fraud;
pub mod ledger;
pub mod orchestrator;
pub mod scoring;
pub mod stats;

pub use config::EngineConfig;
pub use distribution::{RewardDistribution, RewardDistributor, RewardTransaction};
pub use error::{DistributionError, DistributionResult};
pub use orchestrator::RewardOrchestrator;
pub use scoring::{compute_reward, Contribution, ContributionType, RewardBreakdown};
