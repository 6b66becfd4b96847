//! PostgreSQL-backed transaction store using sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::TransactionStore;
use crate::distribution::transaction::{RewardTransaction, TransactionKind, TransactionStatus};
use crate::error::{DistributionError, DistributionResult};

pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub async fn connect(connection_string: &str) -> DistributionResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| DistributionError::Store(format!("failed to connect: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> DistributionResult<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS rewards")
            .execute(&self.pool)
            .await
            .map_err(|e| DistributionError::Store(format!("failed to create schema: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rewards.transactions (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount BIGINT NOT NULL,
                hash TEXT NOT NULL,
                status TEXT NOT NULL,
                block_number BIGINT,
                gas_used BIGINT,
                reason TEXT NOT NULL,
                contribution_id TEXT,
                domain TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DistributionError::Store(format!("failed to create table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS transactions_user_idx \
             ON rewards.transactions (user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DistributionError::Store(format!("failed to create index: {}", e)))?;

        info!("Rewards schema initialized");
        Ok(())
    }

    fn row_to_transaction(row: &sqlx::postgres::PgRow) -> DistributionResult<RewardTransaction> {
        let status: String = row.get("status");
        let kind: String = row.get("kind");
        let amount: i64 = row.get("amount");
        let block_number: Option<i64> = row.get("block_number");
        let gas_used: Option<i64> = row.get("gas_used");
        let timestamp: DateTime<Utc> = row.get("created_at");

        Ok(RewardTransaction {
            id: row.get("id"),
            user_id: row.get("user_id"),
            kind: if kind == "withdrawal" {
                TransactionKind::Withdrawal
            } else {
                TransactionKind::Reward
            },
            amount: amount as u64,
            hash: row.get("hash"),
            status: TransactionStatus::parse(&status).ok_or_else(|| {
                DistributionError::Store(format!("unknown transaction status {}", status))
            })?,
            block_number: block_number.map(|n| n as u64),
            gas_used: gas_used.map(|n| n as u64),
            reason: row.get("reason"),
            contribution_id: row.get("contribution_id"),
            domain: row.get("domain"),
            timestamp,
        })
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create_transaction(&self, tx: &RewardTransaction) -> DistributionResult<()> {
        let kind = match tx.kind {
            TransactionKind::Reward => "reward",
            TransactionKind::Withdrawal => "withdrawal",
        };
        sqlx::query(
            r#"
            INSERT INTO rewards.transactions
            (id, user_id, kind, amount, hash, status, reason, contribution_id, domain, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(tx.id)
        .bind(&tx.user_id)
        .bind(kind)
        .bind(tx.amount as i64)
        .bind(&tx.hash)
        .bind(tx.status.as_str())
        .bind(&tx.reason)
        .bind(&tx.contribution_id)
        .bind(&tx.domain)
        .bind(tx.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| DistributionError::Store(format!("failed to insert transaction: {}", e)))?;

        debug!(tx_id = %tx.id, user_id = %tx.user_id, "Transaction persisted");
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        block_number: Option<u64>,
        gas_used: Option<u64>,
    ) -> DistributionResult<()> {
        sqlx::query(
            r#"
            UPDATE rewards.transactions
            SET status = $2, block_number = $3, gas_used = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(block_number.map(|n| n as i64))
        .bind(gas_used.map(|n| n as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| DistributionError::Store(format!("failed to update status: {}", e)))?;

        debug!(tx_id = %id, status = status.as_str(), "Transaction status updated");
        Ok(())
    }

    async fn transactions_for_user(
        &self,
        user_id: &str,
    ) -> DistributionResult<Vec<RewardTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, amount, hash, status, block_number,
                   gas_used, reason, contribution_id, domain, created_at
            FROM rewards.transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DistributionError::Store(format!("failed to query transactions: {}", e)))?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn has_pending_for(
        &self,
        contribution_id: &str,
        user_id: &str,
    ) -> DistributionResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS pending_count
            FROM rewards.transactions
            WHERE contribution_id = $1 AND user_id = $2 AND status = 'pending'
            "#,
        )
        .bind(contribution_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DistributionError::Store(format!("failed to count pending: {}", e)))?;

        let count: i64 = row.get("pending_count");
        Ok(count > 0)
    }
}
