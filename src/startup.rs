//! Application startup and initialization logic.
//!
//! Wires the services into an `AppState`, seeds the catalog and starts the
//! background maintenance loops.

use anyhow::Result;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::auth::jwt::JwtService;
use crate::config::{Config, PaymentConfig, PaymentProviderKind};
use crate::constants::maintenance;
use crate::database::Store;
use crate::services;
use crate::services::notification_dispatcher::NotificationDispatcherConfig;

/// Initialize application services and create the AppState.
pub async fn initialize_app(config: &Config) -> Result<AppState> {
    info!("🚀 Starting resale exchange ({})", config.environment);

    // Initialize Prometheus metrics exporter
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    info!("✅ Prometheus metrics initialized");

    let gateway = build_gateway(&config.payment)?;
    info!("✅ Payment provider: {}", gateway.name());

    let app_state = build_state(config.clone(), gateway, Some(metrics_handle))?;

    if config.matching.sweep_on_startup {
        match app_state.order_book.match_all_pending().await {
            Ok(trades) => info!("✅ Startup matching sweep created {} trades", trades.len()),
            Err(e) => warn!("⚠️ Startup matching sweep failed: {}", e),
        }
    }

    info!("✅ AppState created successfully");
    Ok(app_state)
}

/// Select the payment provider client from configuration
pub fn build_gateway(config: &PaymentConfig) -> Result<Arc<dyn services::PaymentGateway>> {
    match config.provider {
        PaymentProviderKind::Mock => {
            warn!("Using mock payment provider; every payment is approved at its prepared amount");
            Ok(Arc::new(services::MockPaymentGateway::new()))
        }
        PaymentProviderKind::PortOne => {
            let client = services::PortOneClient::new(
                config.portone_base_url.clone(),
                config.portone_api_secret.clone(),
                config.portone_store_id.clone(),
                Duration::from_secs(config.http_timeout_secs),
            )
            .map_err(|e| anyhow::anyhow!("Failed to build PortOne client: {}", e))?;
            Ok(Arc::new(client))
        }
    }
}

/// Build every service on top of a fresh store
pub fn build_state(
    config: Config,
    gateway: Arc<dyn services::PaymentGateway>,
    metrics_handle: Option<PrometheusHandle>,
) -> Result<AppState> {
    let catalog = services::Catalog::load(config.catalog_seed_path.as_deref())?;
    let store = Store::new();

    let jwt_service = JwtService::new(&config.jwt_secret, &config.jwt_issuer, config.jwt_expiration);

    let notifications = services::NotificationDispatcher::new(NotificationDispatcherConfig {
        channel_capacity: config.notification.channel_capacity,
        ..Default::default()
    });
    let audit_logger = services::AuditLogger::new();
    let penalties = services::PenaltyRegistry::new(config.penalty.cooldown_days);
    let rate_limiter = services::BidRateLimiter::new(config.rate_limit.clone());
    let locks = services::KeyedLocks::new(config.lock.clone());

    let book = services::OrderBook::new(config.lock.clone());
    let engine = services::MatchingEngine::new(store.clone(), catalog.clone(), notifications.clone());
    let order_book = services::OrderBookService::new(
        store.clone(),
        book.clone(),
        engine,
        penalties.clone(),
        rate_limiter.clone(),
        catalog.clone(),
        notifications.clone(),
        config.matching.clone(),
    );

    let trades = services::TradeLifecycle::new(
        store.clone(),
        order_book.clone(),
        penalties.clone(),
        notifications.clone(),
        audit_logger.clone(),
        locks.clone(),
        catalog.clone(),
        config.trade.clone(),
    );

    let retry_delay = Duration::from_millis(config.payment.retry_delay_ms);
    let settlements = services::SettlementService::new(
        store.clone(),
        gateway.clone(),
        notifications.clone(),
        audit_logger.clone(),
        locks.clone(),
        config.settlement.clone(),
        config.payment.retry_attempts,
        retry_delay,
    );
    info!(
        "✅ Settlement config: fee_rate={}, hold={:?}",
        config.settlement.fee_rate, config.settlement.hold_period
    );

    let payments = services::PaymentService::new(
        store.clone(),
        gateway.clone(),
        trades.clone(),
        settlements.clone(),
        audit_logger.clone(),
        locks.clone(),
        catalog.clone(),
        config.payment.retry_attempts,
        retry_delay,
    );

    let admin = services::AdminService::new(
        store.clone(),
        catalog.clone(),
        order_book.clone(),
        trades.clone(),
        audit_logger.clone(),
        config.matching.admin_page_size,
    );

    let health_checker = services::HealthChecker::new(
        store.clone(),
        book,
        locks.clone(),
        config.environment.clone(),
        gateway.name(),
    );

    Ok(AppState {
        config: Arc::new(config),
        store,
        catalog,
        jwt_service,
        order_book,
        trades,
        payments,
        settlements,
        notifications,
        admin,
        audit_logger,
        penalties,
        rate_limiter,
        locks,
        health_checker,
        metrics_handle,
    })
}

/// Run `task` every `period` until the runtime shuts down
fn spawn_interval<F, Fut>(name: &'static str, period: Duration, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send,
{
    tokio::spawn(async move {
        info!("🚀 Starting {} (interval: {:?})", name, period);
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let processed = task().await;
            if processed > 0 {
                tracing::debug!(task = name, processed = processed, "Background task pass");
            }
        }
    })
}

/// Spawn background tasks.
pub fn spawn_background_tasks(app_state: &AppState) -> Vec<JoinHandle<()>> {
    info!("📌 Spawning background tasks...");
    let config = &app_state.config;
    let mut handles = Vec::new();

    let order_book = app_state.order_book.clone();
    handles.push(spawn_interval(
        "bid expiry sweep",
        Duration::from_secs(config.matching.expiry_sweep_secs),
        move || {
            let order_book = order_book.clone();
            async move { order_book.expire_stale(Utc::now()).await }
        },
    ));

    let trades = app_state.trades.clone();
    handles.push(spawn_interval(
        "unpaid trade expiry",
        Duration::from_secs(config.trade.expiry_sweep_secs),
        move || {
            let trades = trades.clone();
            async move { trades.expire_unpaid(Utc::now()).await }
        },
    ));

    let settlements = app_state.settlements.clone();
    handles.push(spawn_interval(
        "settlement processing",
        config.settlement.process_interval,
        move || {
            let settlements = settlements.clone();
            async move { settlements.process_pending(Utc::now()).await }
        },
    ));

    let notifications = app_state.notifications.clone();
    handles.push(spawn_interval(
        "notification redelivery",
        Duration::from_secs(config.notification.redelivery_interval_secs),
        move || {
            let notifications = notifications.clone();
            async move { notifications.redeliver_pending(Utc::now()) }
        },
    ));

    let rate_limiter = app_state.rate_limiter.clone();
    let locks = app_state.locks.clone();
    handles.push(spawn_interval(
        "idle state pruning",
        Duration::from_secs(maintenance::PRUNE_INTERVAL_SECS),
        move || {
            let rate_limiter = rate_limiter.clone();
            let locks = locks.clone();
            async move {
                rate_limiter.prune(Duration::from_secs(maintenance::RATE_BUCKET_IDLE_SECS))
                    + locks.prune()
            }
        },
    ));

    info!("✅ {} background tasks started", handles.len());
    handles
}

/// Wait for shutdown signal.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully");
        },
    }
}
