//! Reward Transaction Lifecycle Types
//!
//! A `RewardTransaction` records one payout attempt. It is created in
//! `Pending` and transitions exactly once to `Confirmed` or `Failed`;
//! terminal states are never reopened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DistributionError, DistributionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "confirmed" => Some(TransactionStatus::Confirmed),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Whether the payout credits earned rewards or pays out accrued balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Reward,
    Withdrawal,
}

/// A payout request, validated before any ledger side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDistribution {
    pub user_id: String,
    pub wallet_address: String,
    pub amount: u64,
    pub reason: String,
    #[serde(default)]
    pub contribution_id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One payout attempt and its ledger outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardTransaction {
    pub id: Uuid,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: u64,
    /// Ledger hash. Batch recipients share one hash.
    pub hash: String,
    pub status: TransactionStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub reason: String,
    pub contribution_id: Option<String>,
    pub domain: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RewardTransaction {
    pub fn pending(req: &RewardDistribution, kind: TransactionKind, hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: req.user_id.clone(),
            kind,
            amount: req.amount,
            hash,
            status: TransactionStatus::Pending,
            block_number: None,
            gas_used: None,
            reason: req.reason.clone(),
            contribution_id: req.contribution_id.clone(),
            domain: req.domain.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Transition to `Confirmed`. Only valid from `Pending`.
    pub fn confirm(&mut self, block_number: u64, gas_used: u64) -> DistributionResult<()> {
        self.ensure_pending("confirm")?;
        self.status = TransactionStatus::Confirmed;
        self.block_number = Some(block_number);
        self.gas_used = Some(gas_used);
        Ok(())
    }

    /// Transition to `Failed`. Only valid from `Pending`. Failed payouts
    /// are never retried automatically.
    pub fn fail(&mut self) -> DistributionResult<()> {
        self.ensure_pending("fail")?;
        self.status = TransactionStatus::Failed;
        Ok(())
    }

    fn ensure_pending(&self, transition: &str) -> DistributionResult<()> {
        if self.status != TransactionStatus::Pending {
            return Err(DistributionError::validation(format!(
                "cannot {} transaction {} in terminal state {}",
                transition,
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RewardDistribution {
        RewardDistribution {
            user_id: "alice".into(),
            wallet_address: "0x1111111111111111111111111111111111111111".into(),
            amount: 100,
            reason: "contribution reward".into(),
            contribution_id: Some("c1".into()),
            domain: Some("energy".into()),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_single_terminal_transition() {
        let mut tx = RewardTransaction::pending(&request(), TransactionKind::Reward, "0xabc".into());
        assert_eq!(tx.status, TransactionStatus::Pending);

        tx.confirm(42, 21_000).unwrap();
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert_eq!(tx.block_number, Some(42));

        // Terminal states never reopen, in either direction.
        assert!(tx.confirm(43, 21_000).is_err());
        assert!(tx.fail().is_err());
        assert_eq!(tx.status, TransactionStatus::Confirmed);
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut tx = RewardTransaction::pending(&request(), TransactionKind::Reward, "0xabc".into());
        tx.fail().unwrap();
        assert!(tx.confirm(1, 1).is_err());
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert!(tx.block_number.is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Confirmed,
            TransactionStatus::Failed,
        ] {
            assert_eq!(TransactionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransactionStatus::parse("reopened"), None);
    }
}
