//! Reward API handlers
//!
//! Endpoints:
//! - `POST /rewards/calculate` - dry-run scoring, no side effects
//! - `POST /rewards/distribute` - score and pay out a contribution
//! - `POST /rewards/withdraw` - user-initiated withdrawal
//! - `GET /rewards/stats/{user_id}` - cached reward statistics
//! - `GET /health` - liveness probe

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::DistributionError;
use crate::fraud::ActionSignals;
use crate::orchestrator::RewardOrchestrator;
use crate::scoring::{Contribution, RewardBreakdown};
use crate::stats::UserRewardStats;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RewardOrchestrator>,
}

/// JSON error body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

/// Maps engine errors onto HTTP statuses.
pub struct ApiError(DistributionError);

impl From<DistributionError> for ApiError {
    fn from(err: DistributionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            DistributionError::Validation { .. } => (StatusCode::BAD_REQUEST, "validation"),
            DistributionError::InsufficientBalance { .. } => {
                (StatusCode::CONFLICT, "insufficient_balance")
            }
            DistributionError::RateLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limit"),
            DistributionError::FraudRiskDenied { .. } => (StatusCode::FORBIDDEN, "risk_denied"),
            DistributionError::LedgerSubmission(_) | DistributionError::LedgerFinality { .. } => {
                (StatusCode::BAD_GATEWAY, "ledger")
            }
            DistributionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail: self.0.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let DistributionError::RateLimit { retry_after_secs } = self.0 {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[derive(Debug, Deserialize)]
pub struct DistributeRequest {
    pub contribution: Contribution,
    #[serde(default)]
    pub signals: ActionSignals,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub user_id: String,
    pub wallet_address: String,
    pub amount: u64,
    #[serde(default)]
    pub signals: ActionSignals,
}

#[derive(Debug, Serialize)]
pub struct DistributeResponse {
    pub transaction_id: uuid::Uuid,
    pub ledger_hash: String,
    pub amount: u64,
    pub status: String,
}

async fn calculate(
    State(state): State<AppState>,
    Json(contribution): Json<Contribution>,
) -> Json<RewardBreakdown> {
    Json(state.orchestrator.calculate(&contribution))
}

async fn distribute(
    State(state): State<AppState>,
    Json(req): Json<DistributeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state
        .orchestrator
        .reward_contribution(&req.contribution, &req.signals)
        .await?;

    info!(
        tx_id = %tx.id,
        user_id = %tx.user_id,
        amount = tx.amount,
        "Distribution accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(DistributeResponse {
            transaction_id: tx.id,
            ledger_hash: tx.hash.clone(),
            amount: tx.amount,
            status: tx.status.as_str().to_string(),
        }),
    ))
}

async fn withdraw(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state
        .orchestrator
        .withdraw(&req.user_id, &req.wallet_address, req.amount, &req.signals)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DistributeResponse {
            transaction_id: tx.id,
            ledger_hash: tx.hash.clone(),
            amount: tx.amount,
            status: tx.status.as_str().to_string(),
        }),
    ))
}

async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserRewardStats>, ApiError> {
    Ok(Json(state.orchestrator.stats(&user_id).await?))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "t4g-rewards",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rewards/calculate", post(calculate))
        .route("/rewards/distribute", post(distribute))
        .route("/rewards/withdraw", post(withdraw))
        .route("/rewards/stats/{user_id}", get(user_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                DistributionError::validation("bad"),
                StatusCode::BAD_REQUEST,
            ),
            (
                DistributionError::InsufficientBalance {
                    available: 5,
                    requested: 10,
                },
                StatusCode::CONFLICT,
            ),
            (
                DistributionError::RateLimit {
                    retry_after_secs: 60,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                DistributionError::FraudRiskDenied { risk_score: 0.9 },
                StatusCode::FORBIDDEN,
            ),
            (
                DistributionError::LedgerSubmission("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                DistributionError::Store("lost".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError(DistributionError::RateLimit {
            retry_after_secs: 30,
        })
        .into_response();
        assert_eq!(
            response.headers().get("Retry-After").unwrap(),
            &HeaderValue::from(30u64)
        );
    }
}
