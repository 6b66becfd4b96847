//! HTTP surface of the reward engine: axum routes plus security middleware.

pub mod middleware;
pub mod rewards;

pub use middleware::{ApiSecurityConfig, IpRateLimiter, SecurityState};
pub use rewards::{create_router, AppState};
