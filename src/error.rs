//! Error taxonomy for the reward engine.
//!
//! Every rejection a caller can see is one of these variants; raw ledger or
//! database error strings never cross the API boundary.

use thiserror::Error;

pub type DistributionResult<T> = Result<T, DistributionError>;

#[derive(Debug, Error)]
pub enum DistributionError {
    /// Malformed input: amount out of bounds, malformed wallet address,
    /// or an already-distributed reward record. Rejected synchronously.
    #[error("validation failed: {rule}")]
    Validation { rule: String },

    /// Ledger pool or user balance too low for the requested payout.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    /// Velocity threshold exceeded. Carries a retry-after hint derived
    /// from the counter window.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit { retry_after_secs: u64 },

    /// Payout denied by the fraud gate. Always logged as a security event.
    #[error("payout denied by fraud gate (risk score {risk_score:.2})")]
    FraudRiskDenied { risk_score: f64 },

    /// Provider/network failure before a transaction handle was obtained.
    /// No state was created; the caller may retry.
    #[error("ledger submission failed: {0}")]
    LedgerSubmission(String),

    /// Transaction reverted or timed out after submission. Recorded as
    /// failed; the caller must issue a fresh distribute call.
    #[error("ledger finality failure for transfer {hash}: {reason}")]
    LedgerFinality { hash: String, reason: String },

    /// Persistent store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl DistributionError {
    pub fn validation(rule: impl Into<String>) -> Self {
        Self::Validation { rule: rule.into() }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerSubmission(_) | Self::Store(_))
    }
}
