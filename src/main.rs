use clinic_booking_engine::api::{self, AppState};
use clinic_booking_engine::config::AppConfig;
use clinic_booking_engine::database::memory::InMemoryStore;
use clinic_booking_engine::database::repository::{BookingRepository, PaymentRepository};
use clinic_booking_engine::health::HealthChecker;
use clinic_booking_engine::logging::init_tracing;
use clinic_booking_engine::payments::factory::PaymentStrategies;
use clinic_booking_engine::payments::provider::{BankLedgerClient, CardGatewayClient};
use clinic_booking_engine::payments::providers::{
    HttpBankLedger, HttpCardGateway, OfflineBankLedger, SandboxCardGateway,
};
use clinic_booking_engine::services::catalog::StaticCatalog;
use clinic_booking_engine::services::notification::{LoggingNotificationDispatcher, Notifier};
use clinic_booking_engine::services::{BookingService, PaymentService};
use clinic_booking_engine::workers::{
    ExpirationSweeper, ExpirationSweeperConfig, ReconciliationPoller, ReconciliationPollerConfig,
};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

struct Storage {
    payments: Arc<dyn PaymentRepository>,
    bookings: Arc<dyn BookingRepository>,
    health: HealthChecker,
}

async fn init_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    let Some(db_config) = config.database.as_ref() else {
        info!("⏭️  Using in-memory store (SKIP_EXTERNALS=true)");
        let store = InMemoryStore::new();
        return Ok(Storage {
            payments: Arc::new(store.clone()),
            bookings: Arc::new(store),
            health: HealthChecker::in_memory(),
        });
    };

    #[cfg(feature = "database")]
    {
        use clinic_booking_engine::database::booking_repository::PgBookingRepository;
        use clinic_booking_engine::database::payment_repository::PgPaymentRepository;
        use clinic_booking_engine::database::{init_pool_from_config, run_migrations};

        info!("📊 Initializing database connection pool...");
        let pool = init_pool_from_config(db_config).await.map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            e
        })?;
        run_migrations(&pool).await?;
        info!(
            max_connections = pool.options().get_max_connections(),
            "✅ Database ready"
        );

        Ok(Storage {
            payments: Arc::new(PgPaymentRepository::new(pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            health: HealthChecker::with_database(pool),
        })
    }

    #[cfg(not(feature = "database"))]
    {
        let _ = db_config;
        anyhow::bail!("built without the `database` feature; set SKIP_EXTERNALS=true")
    }
}

fn init_collaborators(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn CardGatewayClient>, Arc<dyn BankLedgerClient>)> {
    if config.database.is_none() {
        info!("⏭️  Using sandbox card gateway and offline bank ledger");
        return Ok((Arc::new(SandboxCardGateway), Arc::new(OfflineBankLedger)));
    }

    let timeout = config.payments.external_call_timeout();
    let gateway = HttpCardGateway::new(config.card_gateway.clone(), timeout)?;
    let ledger = HttpBankLedger::new(config.bank_ledger.clone(), timeout, config.payments.qr_ttl())?;
    Ok((Arc::new(gateway), Arc::new(ledger)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting clinic booking engine"
    );

    config.validate()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        qr_expiry_hours = config.payments.qr_expiry_hours,
        cancellation_lead_time_hours = config.payments.cancellation_lead_time_hours,
        catalog_entries = config.catalog.prices.len(),
        "Configuration loaded"
    );

    let storage = init_storage(&config).await?;
    let (gateway, ledger) = init_collaborators(&config)?;

    let notifier = Notifier::new(Arc::new(LoggingNotificationDispatcher));
    let payments = PaymentService::new(
        storage.payments.clone(),
        PaymentStrategies::with_config(&config.payments, gateway),
        config.merchant.clone(),
        notifier,
    );
    let bookings = BookingService::new(
        storage.bookings.clone(),
        payments.clone(),
        Arc::new(StaticCatalog::from_config(&config.catalog)),
        config.payments.cancellation_lead_time(),
    );

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut worker_handles = Vec::new();

    let poller_config = ReconciliationPollerConfig::from_env();
    if poller_config.enabled {
        let poller = ReconciliationPoller::new(payments.clone(), ledger, poller_config);
        worker_handles.push(tokio::spawn(poller.run(worker_shutdown_rx.clone())));
    } else {
        info!("QR reconciliation poller disabled by configuration");
    }

    let sweeper_config = ExpirationSweeperConfig::from_env();
    if sweeper_config.enabled {
        let sweeper = ExpirationSweeper::new(payments.clone(), sweeper_config);
        worker_handles.push(tokio::spawn(sweeper.run(worker_shutdown_rx.clone())));
    } else {
        info!("QR expiration sweeper disabled by configuration");
    }

    let app = api::router(AppState {
        payments,
        bookings,
        health: storage.health,
    });
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    for handle in worker_handles {
        if tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            warn!("Timed out waiting for a background worker to stop");
        }
    }

    info!("👋 Server shutdown complete");
    Ok(())
}
