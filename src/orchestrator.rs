//! Reward Orchestrator
//!
//! Composes the scoring engine, fraud gate, ledger client and stats cache:
//! scores a contribution, drives the payout, and marks the reward record
//! distributed exactly once. Also serves dry-run calculation and
//! user-initiated withdrawals.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::distribution::{RewardDistribution, RewardDistributor, RewardTransaction};
use crate::error::{DistributionError, DistributionResult};
use crate::fraud::ActionSignals;
use crate::scoring::{compute_reward, Contribution, RewardBreakdown, RewardRecord};
use crate::stats::{StatsCache, UserRewardStats};

pub struct RewardOrchestrator {
    distributor: Arc<RewardDistributor>,
    stats: Arc<StatsCache>,
    /// Reward records by contribution id. The `distributed` flag here is the
    /// caller-level idempotency contract: the engine itself never
    /// deduplicates ledger submissions.
    records: RwLock<HashMap<String, RewardRecord>>,
    /// Contribution ids with a submission currently in flight. The entry is
    /// the per-contribution reservation: unrelated payouts proceed in
    /// parallel, duplicates of the same contribution do not.
    in_flight: DashMap<String, ()>,
}

impl RewardOrchestrator {
    pub fn new(distributor: Arc<RewardDistributor>, stats: Arc<StatsCache>) -> Self {
        Self {
            distributor,
            stats,
            records: RwLock::new(HashMap::new()),
            in_flight: DashMap::new(),
        }
    }

    /// Dry-run scoring: always succeeds with a full breakdown, no side
    /// effect of any kind.
    pub fn calculate(&self, contribution: &Contribution) -> RewardBreakdown {
        compute_reward(contribution)
    }

    /// Score a contribution, gate it, pay it out, and mark its record
    /// distributed. A second call for an already-distributed contribution
    /// is rejected before the gate or ledger are touched.
    pub async fn reward_contribution(
        &self,
        contribution: &Contribution,
        signals: &ActionSignals,
    ) -> DistributionResult<RewardTransaction> {
        let breakdown = compute_reward(contribution);
        if breakdown.total_reward == 0 {
            return Err(DistributionError::validation(format!(
                "contribution {} scored zero reward",
                contribution.id
            )));
        }

        // Reserve the contribution id before anything else. Holding the
        // records lock across submission would serialize every payout
        // process-wide; the reservation serializes only duplicates of the
        // same contribution.
        if self
            .in_flight
            .insert(contribution.id.clone(), ())
            .is_some()
        {
            return Err(DistributionError::validation(format!(
                "reward for contribution {} is already being submitted",
                contribution.id
            )));
        }

        let outcome = self.submit_reserved(contribution, &breakdown, signals).await;
        self.in_flight.remove(&contribution.id);
        outcome
    }

    /// Body of [`reward_contribution`](Self::reward_contribution); the
    /// caller holds the in-flight reservation for `contribution.id`.
    async fn submit_reserved(
        &self,
        contribution: &Contribution,
        breakdown: &RewardBreakdown,
        signals: &ActionSignals,
    ) -> DistributionResult<RewardTransaction> {
        if let Some(record) = self.records.read().await.get(&contribution.id) {
            if record.distributed {
                return Err(DistributionError::validation(format!(
                    "reward for contribution {} already distributed",
                    contribution.id
                )));
            }
        }

        let req = RewardDistribution {
            user_id: contribution.author_id.clone(),
            wallet_address: author_wallet(contribution),
            amount: breakdown.total_reward,
            reason: format!("contribution reward: {}", contribution.id),
            contribution_id: Some(contribution.id.clone()),
            domain: Some(contribution.domain.clone()),
            metadata: serde_json::Value::Null,
        };

        let tx = self.distributor.distribute(req, signals).await?;

        let mut records = self.records.write().await;
        let record = records
            .entry(contribution.id.clone())
            .or_insert_with(|| breakdown.clone().into_record(contribution.id.clone()));
        record.mark_distributed()?;

        info!(
            contribution_id = %contribution.id,
            author_id = %contribution.author_id,
            total_reward = breakdown.total_reward,
            tx_id = %tx.id,
            "Contribution rewarded"
        );
        Ok(tx)
    }

    /// User-initiated payout of accrued balance. Runs the gate with the
    /// withdrawal velocity kind and checks the user's available balance
    /// before anything touches the ledger.
    pub async fn withdraw(
        &self,
        user_id: &str,
        wallet_address: &str,
        amount: u64,
        signals: &ActionSignals,
    ) -> DistributionResult<RewardTransaction> {
        let stats = self.stats.get(user_id).await?;
        let available = stats.available_balance();
        if available < amount {
            return Err(DistributionError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let req = RewardDistribution {
            user_id: user_id.to_string(),
            wallet_address: wallet_address.to_string(),
            amount,
            reason: "withdrawal".to_string(),
            contribution_id: None,
            domain: None,
            metadata: serde_json::Value::Null,
        };
        self.distributor.distribute_withdrawal(req, signals).await
    }

    pub async fn stats(&self, user_id: &str) -> DistributionResult<UserRewardStats> {
        self.stats.get(user_id).await
    }

    /// The reward record for a contribution, if one has been created.
    pub async fn record(&self, contribution_id: &str) -> Option<RewardRecord> {
        self.records.read().await.get(contribution_id).cloned()
    }
}

/// Contributions carry their author's payout wallet in metadata upstream;
/// here it is derived deterministically until the profile service wires in.
fn author_wallet(contribution: &Contribution) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(contribution.author_id.as_bytes());
    let digest = hasher.finalize();
    format!("0x{}", hex::encode(&digest[..20]))
}
