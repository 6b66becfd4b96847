//! Payout transaction lifecycle: request/transaction types and the
//! distributor that drives them against the ledger.

pub mod distributor;
pub mod transaction;

pub use distributor::{DistributorConfig, RewardDistributor};
pub use transaction::{RewardDistribution, RewardTransaction, TransactionKind, TransactionStatus};
