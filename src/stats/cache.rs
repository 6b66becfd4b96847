//! User Reward Stats Cache
//!
//! Read-through, two-tier cache of per-user reward aggregates. The fast
//! in-process tier expires sooner than the shared tier so a stale entry is
//! bounded after a confirmation without stampeding the shared store. Stats
//! are recomputed from the transaction store on miss and invalidated only
//! on terminal status transitions, never on pending creation.

use chrono::{DateTime, Datelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::database::TransactionStore;
use crate::distribution::transaction::{TransactionKind, TransactionStatus};
use crate::error::DistributionResult;
use crate::stats::store::CacheStore;

/// Derived per-user aggregates. Never hand-edited; always recomputed from
/// the transaction store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRewardStats {
    pub user_id: String,
    /// Sum of confirmed reward amounts.
    pub total_earned: u64,
    /// Sum of pending reward amounts.
    pub pending_rewards: u64,
    /// Sum of confirmed withdrawal amounts.
    pub withdrawn: u64,
    /// Sum of pending withdrawal amounts.
    pub pending_withdrawals: u64,
    pub transaction_count: u64,
    /// Confirmed earnings grouped by contribution domain.
    pub domain_breakdown: HashMap<String, u64>,
    /// Confirmed earnings grouped by "YYYY-MM".
    pub monthly_earnings: BTreeMap<String, u64>,
    pub computed_at: DateTime<Utc>,
}

impl UserRewardStats {
    /// Balance a user may still withdraw: confirmed earnings minus
    /// everything already withdrawn or reserved by a pending withdrawal.
    pub fn available_balance(&self) -> u64 {
        self.total_earned
            .saturating_sub(self.withdrawn)
            .saturating_sub(self.pending_withdrawals)
    }
}

#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub fast: Duration,
    pub shared: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(60),
            shared: Duration::from_secs(300),
        }
    }
}

pub struct StatsCache {
    store: Arc<dyn TransactionStore>,
    shared: Arc<dyn CacheStore>,
    fast: DashMap<String, (UserRewardStats, Instant)>,
    ttls: CacheTtls,
}

impl StatsCache {
    pub fn new(store: Arc<dyn TransactionStore>, shared: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self {
            store,
            shared,
            fast: DashMap::new(),
            ttls,
        }
    }

    /// Read-through get: fast tier, then shared tier, then recompute.
    pub async fn get(&self, user_id: &str) -> DistributionResult<UserRewardStats> {
        if let Some(entry) = self.fast.get(user_id) {
            let (stats, expires_at) = entry.value();
            if *expires_at > Instant::now() {
                return Ok(stats.clone());
            }
        }

        let key = Self::shared_key(user_id);
        if let Some(raw) = self.shared.get(&key).await {
            match serde_json::from_str::<UserRewardStats>(&raw) {
                Ok(stats) => {
                    self.fast.insert(
                        user_id.to_string(),
                        (stats.clone(), Instant::now() + self.ttls.fast),
                    );
                    return Ok(stats);
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Dropping undecodable cached stats");
                    self.shared.invalidate(&key).await;
                }
            }
        }

        let stats = self.recompute(user_id).await?;
        debug!(
            user_id = %user_id,
            total_earned = stats.total_earned,
            pending = stats.pending_rewards,
            "Stats recomputed"
        );
        Ok(stats)
    }

    /// Drop both tiers for a user. Called synchronously with every terminal
    /// transaction transition.
    pub async fn invalidate(&self, user_id: &str) {
        self.fast.remove(user_id);
        self.shared.invalidate(&Self::shared_key(user_id)).await;
        debug!(user_id = %user_id, "Stats cache invalidated");
    }

    async fn recompute(&self, user_id: &str) -> DistributionResult<UserRewardStats> {
        let transactions = self.store.transactions_for_user(user_id).await?;

        let mut stats = UserRewardStats {
            user_id: user_id.to_string(),
            total_earned: 0,
            pending_rewards: 0,
            withdrawn: 0,
            pending_withdrawals: 0,
            transaction_count: transactions.len() as u64,
            domain_breakdown: HashMap::new(),
            monthly_earnings: BTreeMap::new(),
            computed_at: Utc::now(),
        };

        for tx in &transactions {
            match (tx.kind, tx.status) {
                (TransactionKind::Reward, TransactionStatus::Confirmed) => {
                    stats.total_earned += tx.amount;
                    if let Some(domain) = &tx.domain {
                        *stats.domain_breakdown.entry(domain.clone()).or_insert(0) += tx.amount;
                    }
                    let month = format!("{:04}-{:02}", tx.timestamp.year(), tx.timestamp.month());
                    *stats.monthly_earnings.entry(month).or_insert(0) += tx.amount;
                }
                (TransactionKind::Reward, TransactionStatus::Pending) => {
                    stats.pending_rewards += tx.amount;
                }
                (TransactionKind::Withdrawal, TransactionStatus::Confirmed) => {
                    stats.withdrawn += tx.amount;
                }
                (TransactionKind::Withdrawal, TransactionStatus::Pending) => {
                    stats.pending_withdrawals += tx.amount;
                }
                (_, TransactionStatus::Failed) => {}
            }
        }

        if let Ok(raw) = serde_json::to_string(&stats) {
            self.shared
                .set(&Self::shared_key(user_id), raw, self.ttls.shared)
                .await;
        }
        self.fast.insert(
            user_id.to_string(),
            (stats.clone(), Instant::now() + self.ttls.fast),
        );

        Ok(stats)
    }

    fn shared_key(user_id: &str) -> String {
        format!("reward_stats:{}", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryTransactionStore;
    use crate::distribution::transaction::{RewardDistribution, RewardTransaction};
    use crate::stats::store::MemoryCacheStore;

    fn request(user: &str, amount: u64, domain: Option<&str>) -> RewardDistribution {
        RewardDistribution {
            user_id: user.into(),
            wallet_address: "0x1111111111111111111111111111111111111111".into(),
            amount,
            reason: "test".into(),
            contribution_id: None,
            domain: domain.map(String::from),
            metadata: serde_json::Value::Null,
        }
    }

    async fn cache_with_store() -> (StatsCache, Arc<MemoryTransactionStore>) {
        let store = Arc::new(MemoryTransactionStore::new());
        let shared = Arc::new(MemoryCacheStore::new());
        let cache = StatsCache::new(store.clone(), shared, CacheTtls::default());
        (cache, store)
    }

    #[tokio::test]
    async fn test_read_through_and_aggregation() {
        let (cache, store) = cache_with_store().await;

        let mut confirmed =
            RewardTransaction::pending(&request("alice", 200, Some("energy")), TransactionKind::Reward, "0xa".into());
        confirmed.confirm(1, 21_000).unwrap();
        store.create_transaction(&confirmed).await.unwrap();

        let pending =
            RewardTransaction::pending(&request("alice", 50, None), TransactionKind::Reward, "0xb".into());
        store.create_transaction(&pending).await.unwrap();

        let stats = cache.get("alice").await.unwrap();
        assert_eq!(stats.total_earned, 200);
        assert_eq!(stats.pending_rewards, 50);
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.domain_breakdown.get("energy"), Some(&200));
        assert_eq!(stats.monthly_earnings.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidation_reflects_new_confirmation() {
        let (cache, store) = cache_with_store().await;

        let stats = cache.get("alice").await.unwrap();
        assert_eq!(stats.total_earned, 0);

        let mut tx =
            RewardTransaction::pending(&request("alice", 120, None), TransactionKind::Reward, "0xa".into());
        tx.confirm(1, 21_000).unwrap();
        store.create_transaction(&tx).await.unwrap();

        // Still cached until invalidated.
        assert_eq!(cache.get("alice").await.unwrap().total_earned, 0);

        cache.invalidate("alice").await;
        assert_eq!(cache.get("alice").await.unwrap().total_earned, 120);
    }

    #[tokio::test]
    async fn test_available_balance_accounts_for_withdrawals() {
        let (cache, store) = cache_with_store().await;

        let mut earned =
            RewardTransaction::pending(&request("alice", 500, None), TransactionKind::Reward, "0xa".into());
        earned.confirm(1, 21_000).unwrap();
        store.create_transaction(&earned).await.unwrap();

        let mut withdrawn =
            RewardTransaction::pending(&request("alice", 150, None), TransactionKind::Withdrawal, "0xb".into());
        withdrawn.confirm(2, 21_000).unwrap();
        store.create_transaction(&withdrawn).await.unwrap();

        let pending_withdrawal =
            RewardTransaction::pending(&request("alice", 100, None), TransactionKind::Withdrawal, "0xc".into());
        store.create_transaction(&pending_withdrawal).await.unwrap();

        let stats = cache.get("alice").await.unwrap();
        assert_eq!(stats.available_balance(), 250);
    }
}
