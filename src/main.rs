//! T4G rewards service entrypoint.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use t4g_rewards::api::{self, ApiSecurityConfig, AppState, SecurityState};
use t4g_rewards::config::EngineConfig;
use t4g_rewards::database::{MemoryTransactionStore, PgTransactionStore, TransactionStore};
use t4g_rewards::distribution::{DistributorConfig, RewardDistributor};
use t4g_rewards::fraud::{FraudConfig, FraudGate};
use t4g_rewards::ledger::InMemoryTokenLedger;
use t4g_rewards::orchestrator::RewardOrchestrator;
use t4g_rewards::stats::{CacheTtls, MemoryCacheStore, StatsCache};

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("t4g_rewards={}", config.logging.level).into()),
        )
        .init();

    info!("Starting T4G reward engine");

    let store: Arc<dyn TransactionStore> = if config.database.postgres_enabled {
        let pg = PgTransactionStore::connect(&config.database.postgres_url).await?;
        pg.init_schema().await?;
        info!("Connected to PostgreSQL transaction store");
        Arc::new(pg)
    } else {
        warn!("PostgreSQL disabled, transactions are held in memory only");
        Arc::new(MemoryTransactionStore::new())
    };

    let ledger = Arc::new(InMemoryTokenLedger::new(
        &config.ledger.pool_address,
        config.ledger.dev_pool_balance,
        Duration::from_millis(20),
    ));

    let stats = Arc::new(StatsCache::new(
        store.clone(),
        Arc::new(MemoryCacheStore::new()),
        CacheTtls {
            fast: Duration::from_secs(config.cache.fast_ttl_secs),
            shared: Duration::from_secs(config.cache.shared_ttl_secs),
        },
    ));

    let gate = Arc::new(FraudGate::new(FraudConfig {
        alert_threshold: config.fraud.alert_threshold,
        daily_amount_cap: config.fraud.daily_amount_cap,
    }));

    let distributor = Arc::new(RewardDistributor::new(
        ledger,
        store,
        gate.clone(),
        stats.clone(),
        DistributorConfig {
            pool_address: config.ledger.pool_address.clone(),
            single_payout_cap: config.ledger.single_payout_cap,
            finality_timeout: config.finality_timeout(),
        },
    ));

    let orchestrator = Arc::new(RewardOrchestrator::new(distributor, stats));

    let security = SecurityState::new(ApiSecurityConfig {
        rate_limit_per_minute: config.security.rate_limit_per_minute,
        max_request_size: config.security.max_request_size,
        log_requests: config.security.log_requests,
        sanitize_logs: config.security.sanitize_logs,
    });

    // Hourly sweep of expired velocity windows and rate-limit buckets.
    {
        let gate = gate.clone();
        let limiter = security.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                gate.cleanup();
                limiter.cleanup();
            }
        });
    }

    let app = api::create_router(AppState { orchestrator })
        .layer(axum::middleware::from_fn_with_state(
            security.clone(),
            api::middleware::logging_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            security.clone(),
            api::middleware::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            security.clone(),
            api::middleware::body_size_middleware,
        ))
        .layer(axum::middleware::from_fn(
            api::middleware::security_headers_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "Reward API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
