//! Reward Distributor
//!
//! Owns the payout transaction lifecycle: validate (fail fast, no side
//! effect), submit to the ledger, track the transaction in the pending map,
//! and resolve it from a background finality watcher. The pending map is the
//! only shared mutable state; it is owned here, keyed by ledger hash, and
//! guarded by an RwLock. A batch submission stores all of its per-recipient
//! transactions under the one shared hash, so the single watcher resolves
//! them to the same terminal state together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::database::TransactionStore;
use crate::distribution::transaction::{
    RewardDistribution, RewardTransaction, TransactionKind,
};
use crate::error::{DistributionError, DistributionResult};
use crate::fraud::{ActionKind, ActionSignals, FraudGate, RiskAssessment};
use crate::ledger::{is_valid_address, FinalityStatus, TokenLedger};
use crate::stats::StatsCache;

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Rewards pool address payouts are drawn from.
    pub pool_address: String,
    /// Hard cap on a single payout, in T4G units.
    pub single_payout_cap: u64,
    /// Bound on how long a finality watcher waits before declaring failure.
    pub finality_timeout: Duration,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            pool_address: crate::ledger::DEV_POOL_ADDRESS.to_string(),
            single_payout_cap: 10_000,
            finality_timeout: Duration::from_secs(120),
        }
    }
}

type PendingMap = Arc<RwLock<HashMap<String, Vec<RewardTransaction>>>>;

pub struct RewardDistributor {
    ledger: Arc<dyn TokenLedger>,
    store: Arc<dyn TransactionStore>,
    gate: Arc<FraudGate>,
    stats: Arc<StatsCache>,
    /// In-flight transactions keyed by ledger hash. Entries are inserted at
    /// submission and removed exactly once by the finality watcher.
    pending: PendingMap,
    config: DistributorConfig,
}

impl RewardDistributor {
    pub fn new(
        ledger: Arc<dyn TokenLedger>,
        store: Arc<dyn TransactionStore>,
        gate: Arc<FraudGate>,
        stats: Arc<StatsCache>,
        config: DistributorConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            gate,
            stats,
            pending: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Submit a single reward payout. Returns the still-pending transaction;
    /// a background watcher resolves it to confirmed or failed.
    pub async fn distribute(
        &self,
        req: RewardDistribution,
        signals: &ActionSignals,
    ) -> DistributionResult<RewardTransaction> {
        self.submit(req, TransactionKind::Reward, ActionKind::Rewards, signals)
            .await
    }

    /// Submit a user-initiated withdrawal. Gated with the withdrawal
    /// velocity kind; the caller is responsible for the available-balance
    /// check before invoking this.
    pub async fn distribute_withdrawal(
        &self,
        req: RewardDistribution,
        signals: &ActionSignals,
    ) -> DistributionResult<RewardTransaction> {
        self.submit(req, TransactionKind::Withdrawal, ActionKind::Withdrawal, signals)
            .await
    }

    /// Submit a batch of reward payouts as one atomic ledger operation.
    /// Every request is validated before anything is submitted; all
    /// per-recipient transactions share one hash and reach the same
    /// terminal state together.
    pub async fn distribute_batch(
        &self,
        reqs: Vec<RewardDistribution>,
        signals: &ActionSignals,
    ) -> DistributionResult<Vec<RewardTransaction>> {
        if reqs.is_empty() {
            return Err(DistributionError::validation("batch must not be empty"));
        }

        let total: u64 = reqs.iter().map(|r| r.amount).sum();
        let mut reserved: Vec<(String, u64)> = Vec::new();
        for req in &reqs {
            if let Err(e) = self
                .validate(req, ActionKind::Rewards, signals, total)
                .await
            {
                for (user, amount) in reserved {
                    self.gate.release_amount(&user, amount);
                }
                return Err(e);
            }
            reserved.push((req.user_id.clone(), req.amount));
        }

        let recipients: Vec<String> = reqs.iter().map(|r| r.wallet_address.clone()).collect();
        let amounts: Vec<u64> = reqs.iter().map(|r| r.amount).collect();

        let hash = match self.ledger.batch_transfer(&recipients, &amounts).await {
            Ok(hash) => hash,
            Err(e) => {
                for (user, amount) in reserved {
                    self.gate.release_amount(&user, amount);
                }
                return Err(e);
            }
        };

        let transactions: Vec<RewardTransaction> = reqs
            .iter()
            .map(|req| RewardTransaction::pending(req, TransactionKind::Reward, hash.clone()))
            .collect();

        for tx in &transactions {
            if let Err(e) = self.store.create_transaction(tx).await {
                warn!(tx_id = %tx.id, error = %e, "Failed to persist batch transaction");
            }
        }

        self.pending
            .write()
            .await
            .insert(hash.clone(), transactions.clone());
        self.spawn_watcher(hash.clone());

        info!(
            hash = %hash,
            recipients = transactions.len(),
            total,
            "Batch payout submitted"
        );
        Ok(transactions)
    }

    /// Number of in-flight ledger operations.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_pending(&self, hash: &str) -> bool {
        self.pending.read().await.contains_key(hash)
    }

    async fn submit(
        &self,
        req: RewardDistribution,
        kind: TransactionKind,
        action: ActionKind,
        signals: &ActionSignals,
    ) -> DistributionResult<RewardTransaction> {
        self.validate(&req, action, signals, req.amount).await?;

        let hash = match self.ledger.transfer(&req.wallet_address, req.amount).await {
            Ok(hash) => hash,
            Err(e) => {
                if action == ActionKind::Rewards {
                    self.gate.release_amount(&req.user_id, req.amount);
                }
                return Err(e);
            }
        };

        let tx = RewardTransaction::pending(&req, kind, hash.clone());

        // Persisting is best-effort at this point: the transfer is already
        // on the ledger, so a store hiccup must not orphan the watcher.
        if let Err(e) = self.store.create_transaction(&tx).await {
            warn!(tx_id = %tx.id, error = %e, "Failed to persist pending transaction");
        }

        self.pending
            .write()
            .await
            .insert(hash.clone(), vec![tx.clone()]);
        self.spawn_watcher(hash.clone());

        info!(
            tx_id = %tx.id,
            user_id = %tx.user_id,
            amount = tx.amount,
            hash = %hash,
            "Payout submitted, awaiting finality"
        );
        Ok(tx)
    }

    /// Fail-fast validation. No side effect on failure except that an
    /// allowed gate assessment reserves the amount against the daily cap;
    /// submission failures release it.
    async fn validate(
        &self,
        req: &RewardDistribution,
        action: ActionKind,
        signals: &ActionSignals,
        required_pool_balance: u64,
    ) -> DistributionResult<()> {
        if req.amount < 1 {
            return Err(DistributionError::validation("amount must be at least 1"));
        }
        if req.amount > self.config.single_payout_cap {
            return Err(DistributionError::validation(format!(
                "amount {} exceeds single payout cap {}",
                req.amount, self.config.single_payout_cap
            )));
        }
        if !is_valid_address(&req.wallet_address) {
            return Err(DistributionError::validation(format!(
                "malformed wallet address {}",
                req.wallet_address
            )));
        }

        let pool_balance = self.ledger.balance_of(&self.config.pool_address).await?;
        if pool_balance < required_pool_balance {
            return Err(DistributionError::InsufficientBalance {
                available: pool_balance,
                requested: required_pool_balance,
            });
        }

        // A contribution with an unresolved payout cannot be paid again
        // until its watcher settles the first attempt.
        if action == ActionKind::Rewards {
            if let Some(contribution_id) = &req.contribution_id {
                if self
                    .store
                    .has_pending_for(contribution_id, &req.user_id)
                    .await?
                {
                    return Err(DistributionError::validation(format!(
                        "payout for contribution {} is still pending",
                        contribution_id
                    )));
                }
            }
        }

        // The daily amount cap only applies to reward payouts.
        let capped_amount = (action == ActionKind::Rewards).then_some(req.amount);
        let assessment = self
            .gate
            .assess(&req.user_id, action, signals, capped_amount);
        if !assessment.allowed {
            if let Some(amount) = capped_amount {
                if !assessment.daily_cap_exceeded {
                    // The reservation went through but risk denied the
                    // payout; give the budget back.
                    self.gate.release_amount(&req.user_id, amount);
                }
            }
            return Err(Self::denial_error(&assessment));
        }

        Ok(())
    }

    fn denial_error(assessment: &RiskAssessment) -> DistributionError {
        if assessment.daily_cap_exceeded || assessment.retry_after_secs.is_some() {
            DistributionError::RateLimit {
                retry_after_secs: assessment.retry_after_secs.unwrap_or(86_400),
            }
        } else {
            DistributionError::FraudRiskDenied {
                risk_score: assessment.risk_score,
            }
        }
    }

    fn spawn_watcher(&self, hash: String) {
        let ledger = self.ledger.clone();
        let store = self.store.clone();
        let stats = self.stats.clone();
        let pending = self.pending.clone();
        let timeout = self.config.finality_timeout;

        tokio::spawn(async move {
            let report =
                match tokio::time::timeout(timeout, ledger.wait_for_finality(&hash, timeout)).await
                {
                    Ok(Ok(report)) => Some(report),
                    Ok(Err(e)) => {
                        warn!(hash = %hash, error = %e, "Finality check failed");
                        None
                    }
                    Err(_) => {
                        warn!(hash = %hash, timeout_secs = timeout.as_secs(), "Finality watch timed out");
                        None
                    }
                };

            // Removing the entry is the single point of terminal
            // transition; a hash can only be resolved once.
            let Some(mut transactions) = pending.write().await.remove(&hash) else {
                return;
            };

            let final_report = report.filter(|r| r.status == FinalityStatus::Success);
            let success = final_report.is_some();

            let mut affected_users: HashSet<String> = HashSet::new();
            for tx in transactions.iter_mut() {
                affected_users.insert(tx.user_id.clone());
                let transition = match &final_report {
                    Some(r) => tx.confirm(r.block_number, r.gas_used),
                    None => tx.fail(),
                };
                if let Err(e) = transition {
                    warn!(tx_id = %tx.id, error = %e, "Skipping double transition");
                    continue;
                }

                if let Err(e) = store
                    .update_status(tx.id, tx.status, tx.block_number, tx.gas_used)
                    .await
                {
                    warn!(tx_id = %tx.id, error = %e, "Failed to persist terminal status");
                }

                if success {
                    info!(
                        tx_id = %tx.id,
                        user_id = %tx.user_id,
                        amount = tx.amount,
                        block_number = ?tx.block_number,
                        "Payout confirmed"
                    );
                } else {
                    // No automatic retry: the caller must resubmit, which
                    // re-runs full validation.
                    warn!(
                        tx_id = %tx.id,
                        user_id = %tx.user_id,
                        amount = tx.amount,
                        hash = %hash,
                        "Payout failed, caller must resubmit"
                    );
                }
            }

            // Stats reflect confirmed totals plus the current pending sum,
            // so every terminal transition changes them: a failed payout
            // must leave pending_rewards just as a confirmation must move
            // amounts into total_earned. Invalidate synchronously with the
            // transition and warm the cache right away.
            for user_id in affected_users {
                stats.invalidate(&user_id).await;
                if let Err(e) = stats.get(&user_id).await {
                    debug!(user_id = %user_id, error = %e, "Stats rewarm failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryTransactionStore;
    use crate::distribution::transaction::TransactionStatus;
    use crate::fraud::FraudConfig;
    use crate::ledger::InMemoryTokenLedger;
    use crate::stats::{CacheTtls, MemoryCacheStore};

    const WALLET: &str = "0x1111111111111111111111111111111111111111";

    struct Fixture {
        distributor: RewardDistributor,
        ledger: Arc<InMemoryTokenLedger>,
        store: Arc<MemoryTransactionStore>,
        stats: Arc<StatsCache>,
    }

    fn fixture_with(fraud: FraudConfig, pool_balance: u64) -> Fixture {
        let ledger = Arc::new(InMemoryTokenLedger::new(
            crate::ledger::DEV_POOL_ADDRESS,
            pool_balance,
            Duration::from_millis(5),
        ));
        let store = Arc::new(MemoryTransactionStore::new());
        let stats = Arc::new(StatsCache::new(
            store.clone(),
            Arc::new(MemoryCacheStore::new()),
            CacheTtls::default(),
        ));
        let gate = Arc::new(FraudGate::new(fraud));
        let distributor = RewardDistributor::new(
            ledger.clone(),
            store.clone(),
            gate,
            stats.clone(),
            DistributorConfig {
                finality_timeout: Duration::from_secs(2),
                ..DistributorConfig::default()
            },
        );
        Fixture {
            distributor,
            ledger,
            store,
            stats,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FraudConfig::default(), 1_000_000)
    }

    fn request(user: &str, amount: u64) -> RewardDistribution {
        RewardDistribution {
            user_id: user.into(),
            wallet_address: WALLET.into(),
            amount,
            reason: "contribution reward".into(),
            contribution_id: Some("c1".into()),
            domain: Some("energy".into()),
            metadata: serde_json::Value::Null,
        }
    }

    async fn settle(f: &Fixture) {
        // Finality delay is 5ms; give the watcher room to run.
        for _ in 0..100 {
            if f.distributor.pending_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("watcher never settled");
    }

    #[tokio::test]
    async fn test_distribute_confirms_and_updates_stats() {
        let f = fixture();
        let tx = f
            .distributor
            .distribute(request("alice", 300), &ActionSignals::default())
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(f.distributor.is_pending(&tx.hash).await);

        settle(&f).await;

        let stored = &f.store.transactions_for_user("alice").await.unwrap()[0];
        assert_eq!(stored.status, TransactionStatus::Confirmed);
        assert!(stored.block_number.is_some());
        assert_eq!(f.stats.get("alice").await.unwrap().total_earned, 300);
    }

    #[tokio::test]
    async fn test_validation_failures_touch_nothing() {
        let f = fixture();
        let cases = vec![
            request("alice", 0),
            request("alice", 10_001),
            RewardDistribution {
                wallet_address: "not-an-address".into(),
                ..request("alice", 100)
            },
        ];
        for req in cases {
            assert!(matches!(
                f.distributor
                    .distribute(req, &ActionSignals::default())
                    .await,
                Err(DistributionError::Validation { .. })
            ));
        }
        assert_eq!(f.ledger.submitted_transfer_count().await, 0);
        assert!(f.store.transactions_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pool_balance_checked_before_submission() {
        let f = fixture_with(FraudConfig::default(), 50);
        let err = f
            .distributor
            .distribute(request("alice", 100), &ActionSignals::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::InsufficientBalance { available: 50, requested: 100 }));
        assert_eq!(f.ledger.submitted_transfer_count().await, 0);
    }

    #[tokio::test]
    async fn test_fraud_denial_before_ledger() {
        let f = fixture();
        let risky = ActionSignals {
            ip_risk: 1.0,
            device_risk: 1.0,
            behavior_risk: 1.0,
            geography_risk: 1.0,
        };
        let err = f
            .distributor
            .distribute(request("alice", 100), &risky)
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::FraudRiskDenied { .. }));
        assert_eq!(f.ledger.submitted_transfer_count().await, 0);
    }

    #[tokio::test]
    async fn test_daily_cap_is_rate_limit() {
        let f = fixture_with(
            FraudConfig {
                alert_threshold: 0.7,
                daily_amount_cap: 500,
            },
            1_000_000,
        );
        f.distributor
            .distribute(request("alice", 400), &ActionSignals::default())
            .await
            .unwrap();
        let err = f
            .distributor
            .distribute(
                RewardDistribution {
                    contribution_id: Some("c2".into()),
                    ..request("alice", 200)
                },
                &ActionSignals::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::RateLimit { .. }));
        settle(&f).await;
    }

    #[tokio::test]
    async fn test_unresolved_contribution_payout_not_repeatable() {
        let f = fixture();
        f.distributor
            .distribute(request("alice", 100), &ActionSignals::default())
            .await
            .unwrap();

        // Same contribution again while the first payout is still pending.
        let err = f
            .distributor
            .distribute(request("alice", 100), &ActionSignals::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::Validation { .. }));
        assert_eq!(f.ledger.submitted_transfer_count().await, 1);

        settle(&f).await;
    }

    #[tokio::test]
    async fn test_failed_finality_recorded_not_retried() {
        let f = fixture();
        let tx = f
            .distributor
            .distribute(request("alice", 300), &ActionSignals::default())
            .await
            .unwrap();
        f.ledger.revert_transfer(&tx.hash).await;

        settle(&f).await;

        let stored = &f.store.transactions_for_user("alice").await.unwrap()[0];
        assert_eq!(stored.status, TransactionStatus::Failed);
        // One submission, no automatic retry.
        assert_eq!(f.ledger.submitted_transfer_count().await, 1);
        assert_eq!(f.stats.get("alice").await.unwrap().total_earned, 0);
    }

    #[tokio::test]
    async fn test_failed_transition_invalidates_cached_stats() {
        let f = fixture();
        let tx = f
            .distributor
            .distribute(request("alice", 300), &ActionSignals::default())
            .await
            .unwrap();

        // Warm both cache tiers while the payout is still pending.
        assert_eq!(f.stats.get("alice").await.unwrap().pending_rewards, 300);

        f.ledger.revert_transfer(&tx.hash).await;
        settle(&f).await;

        // A failed payout is a terminal transition too: the cached pending
        // sum must drop immediately, not linger until the TTL expires.
        let stats = f.stats.get("alice").await.unwrap();
        assert_eq!(stats.pending_rewards, 0);
        assert_eq!(stats.total_earned, 0);
    }

    #[tokio::test]
    async fn test_batch_confirms_atomically() {
        let f = fixture();
        let txs = f
            .distributor
            .distribute_batch(
                vec![request("alice", 100), request("bob", 200)],
                &ActionSignals::default(),
            )
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].hash, txs[1].hash);

        settle(&f).await;

        for user in ["alice", "bob"] {
            let stored = &f.store.transactions_for_user(user).await.unwrap()[0];
            assert_eq!(stored.status, TransactionStatus::Confirmed);
        }
    }

    #[tokio::test]
    async fn test_batch_reverts_atomically() {
        let f = fixture();
        let txs = f
            .distributor
            .distribute_batch(
                vec![request("alice", 100), request("bob", 200)],
                &ActionSignals::default(),
            )
            .await
            .unwrap();
        f.ledger.revert_transfer(&txs[0].hash).await;

        settle(&f).await;

        // Never a mix of confirmed and failed within one batch.
        for user in ["alice", "bob"] {
            let stored = &f.store.transactions_for_user(user).await.unwrap()[0];
            assert_eq!(stored.status, TransactionStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_batch_validation_precedes_submission() {
        let f = fixture();
        let err = f
            .distributor
            .distribute_batch(
                vec![request("alice", 100), request("bob", 0)],
                &ActionSignals::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DistributionError::Validation { .. }));
        assert_eq!(f.ledger.submitted_transfer_count().await, 0);
    }
}
