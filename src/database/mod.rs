//! Transaction Persistence
//!
//! The engine persists every payout attempt through the `TransactionStore`
//! trait. Production runs against PostgreSQL; tests and dev mode use the
//! in-memory store.

pub mod postgres;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::distribution::transaction::{RewardTransaction, TransactionStatus};
use crate::error::{DistributionError, DistributionResult};

pub use postgres::PgTransactionStore;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create_transaction(&self, tx: &RewardTransaction) -> DistributionResult<()>;

    /// Record a terminal status transition for one transaction.
    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> DistributionResult<()>;

    /// All payout attempts for a user, newest first.
    async fn transactions_for_user(&self, user_id: &str)
        -> DistributionResult<Vec<RewardTransaction>>;

    /// Whether a pending payout already exists for `(contribution, user)`.
    /// Callers use this before retrying a distribute call.
    async fn has_pending_for(
        &self,
        contribution_id: &str,
        user_id: &str,
    ) -> DistributionResult<bool>;
}

/// In-memory store for tests and dev mode.
pub struct MemoryTransactionStore {
    transactions: RwLock<HashMap<Uuid, RewardTransaction>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create_transaction(&self, tx: &RewardTransaction) -> DistributionResult<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.id) {
            return Err(DistributionError::Store(format!(
                "transaction {} already exists",
                tx.id
            )));
        }
        transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> DistributionResult<()> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(&id)
            .ok_or_else(|| DistributionError::Store(format!("transaction {} not found", id)))?;
        tx.status = status;
        tx.block_number = block_number;
        tx.gas_used = gas_used;
        Ok(())
    }

    async fn transactions_for_user(
        &self,
        user_id: &str,
    ) -> DistributionResult<Vec<RewardTransaction>> {
        let transactions = self.transactions.read().await;
        let mut result: Vec<RewardTransaction> = transactions
            .values()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(result)
    }

    async fn has_pending_for(
        &self,
        contribution_id: &str,
        user_id: &str,
    ) -> DistributionResult<bool> {
        let transactions = self.transactions.read().await;
        Ok(transactions.values().any(|tx| {
            tx.user_id == user_id
                && tx.status == TransactionStatus::Pending
                && tx.contribution_id.as_deref() == Some(contribution_id)
        }))
    }
}
