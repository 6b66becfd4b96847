//! Token Ledger Abstraction
//!
//! The engine consumes the T4G token contract through this trait: submit a
//! transfer (single or batch), read balances, and await finality. The
//! in-memory implementation backs tests and dev mode, mirroring how a real
//! adapter behaves: transfers debit the rewards pool immediately and report
//! finality after a configurable delay, with an explicit revert hook.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{DistributionError, DistributionResult};

/// Default rewards pool address for dev mode.
pub const DEV_POOL_ADDRESS: &str = "0x7434670000000000000000000000000000000001";

/// Terminal outcome of a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityStatus {
    Success,
    Reverted,
}

/// Finality report for a submitted transfer.
#[derive(Debug, Clone)]
pub struct FinalityReport {
    pub status: FinalityStatus,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Well-formedness check for wallet addresses: 0x followed by 40 hex chars.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Submit a single transfer from the rewards pool. Returns the
    /// transaction hash; the transfer is not final until
    /// [`wait_for_finality`](Self::wait_for_finality) reports on it.
    async fn transfer(&self, to: &str, amount: u64) -> DistributionResult<String>;

    /// Submit one atomic batch transfer. All recipients share the returned
    /// hash and finalize (or revert) together.
    async fn batch_transfer(&self, to: &[String], amounts: &[u64]) -> DistributionResult<String>;

    async fn balance_of(&self, address: &str) -> DistributionResult<u64>;

    /// Await the terminal outcome of a submitted transfer. The engine wraps
    /// this in its own bounded timeout; implementations should still not
    /// block far beyond `timeout`.
    async fn wait_for_finality(
        &self,
        hash: &str,
        timeout: Duration,
    ) -> DistributionResult<FinalityReport>;
}

#[derive(Debug, Clone)]
struct TransferEntry {
    to: Vec<String>,
    amounts: Vec<u64>,
    reverted: bool,
}

/// In-memory ledger for tests and dev mode.
pub struct InMemoryTokenLedger {
    accounts: RwLock<HashMap<String, u64>>,
    transfers: RwLock<HashMap<String, TransferEntry>>,
    pool_address: String,
    finality_delay: Duration,
    nonce: AtomicU64,
    block_height: AtomicU64,
}

impl InMemoryTokenLedger {
    pub fn new(pool_address: impl Into<String>, pool_balance: u64, finality_delay: Duration) -> Self {
        let pool_address = pool_address.into();
        let mut accounts = HashMap::new();
        accounts.insert(pool_address.clone(), pool_balance);
        info!(
            pool_address = %pool_address,
            pool_balance,
            "In-memory ledger initialized"
        );
        Self {
            accounts: RwLock::new(accounts),
            transfers: RwLock::new(HashMap::new()),
            pool_address,
            finality_delay,
            nonce: AtomicU64::new(0),
            block_height: AtomicU64::new(1),
        }
    }

    /// Dev-mode ledger with a funded pool and fast finality.
    pub fn dev() -> Self {
        Self::new(DEV_POOL_ADDRESS, 1_000_000_000, Duration::from_millis(20))
    }

    /// Mark a submitted transfer as reverted and undo its balance effects.
    /// The next finality report for it will read `Reverted`.
    pub async fn revert_transfer(&self, hash: &str) {
        let mut transfers = self.transfers.write().await;
        if let Some(entry) = transfers.get_mut(hash) {
            if !entry.reverted {
                entry.reverted = true;
                let mut accounts = self.accounts.write().await;
                for (to, amount) in entry.to.iter().zip(entry.amounts.iter()) {
                    if let Some(balance) = accounts.get_mut(to) {
                        *balance = balance.saturating_sub(*amount);
                    }
                    *accounts.entry(self.pool_address.clone()).or_insert(0) += amount;
                }
                debug!(hash = %hash, "Transfer reverted, balances restored");
            }
        }
    }

    pub async fn submitted_transfer_count(&self) -> usize {
        self.transfers.read().await.len()
    }

    fn next_hash(&self, to: &[String], amounts: &[u64]) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        for (recipient, amount) in to.iter().zip(amounts.iter()) {
            hasher.update(recipient.as_bytes());
            hasher.update(amount.to_le_bytes());
        }
        hasher.update(nonce.to_le_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }

    async fn execute(&self, to: &[String], amounts: &[u64]) -> DistributionResult<String> {
        if to.len() != amounts.len() || to.is_empty() {
            return Err(DistributionError::LedgerSubmission(
                "recipient/amount length mismatch".into(),
            ));
        }

        let total: u64 = amounts.iter().sum();
        let mut accounts = self.accounts.write().await;
        let pool = accounts.get(&self.pool_address).copied().unwrap_or(0);
        if pool < total {
            return Err(DistributionError::LedgerSubmission(format!(
                "pool balance {} below transfer total {}",
                pool, total
            )));
        }

        *accounts.entry(self.pool_address.clone()).or_insert(0) = pool - total;
        for (recipient, amount) in to.iter().zip(amounts.iter()) {
            *accounts.entry(recipient.clone()).or_insert(0) += amount;
        }
        drop(accounts);

        let hash = self.next_hash(to, amounts);
        self.transfers.write().await.insert(
            hash.clone(),
            TransferEntry {
                to: to.to_vec(),
                amounts: amounts.to_vec(),
                reverted: false,
            },
        );

        debug!(hash = %hash, recipients = to.len(), total, "Transfer submitted");
        Ok(hash)
    }
}

#[async_trait]
impl TokenLedger for InMemoryTokenLedger {
    async fn transfer(&self, to: &str, amount: u64) -> DistributionResult<String> {
        self.execute(&[to.to_string()], &[amount]).await
    }

    async fn batch_transfer(&self, to: &[String], amounts: &[u64]) -> DistributionResult<String> {
        self.execute(to, amounts).await
    }

    async fn balance_of(&self, address: &str) -> DistributionResult<u64> {
        Ok(self.accounts.read().await.get(address).copied().unwrap_or(0))
    }

    async fn wait_for_finality(
        &self,
        hash: &str,
        timeout: Duration,
    ) -> DistributionResult<FinalityReport> {
        tokio::time::sleep(self.finality_delay.min(timeout)).await;

        let transfers = self.transfers.read().await;
        let entry = transfers
            .get(hash)
            .ok_or_else(|| DistributionError::LedgerFinality {
                hash: hash.to_string(),
                reason: "unknown transfer".into(),
            })?;

        let status = if entry.reverted {
            FinalityStatus::Reverted
        } else {
            FinalityStatus::Success
        };
        let gas_used = 21_000 + 8_000 * entry.to.len() as u64;

        Ok(FinalityReport {
            status,
            block_number: self.block_height.fetch_add(1, Ordering::SeqCst),
            gas_used,
        })
    }
}
