use std::sync::Arc;

use mt5_sync_engine::api::create_router;
use mt5_sync_engine::config::Config;
use mt5_sync_engine::crypto::{AesGcmCipher, CredentialCipher};
use mt5_sync_engine::queue::SyncQueue;
use mt5_sync_engine::risk::{BreakerConfig, DisabledAccounts, LoginFailureBreaker};
use mt5_sync_engine::scheduler::SyncScheduler;
use mt5_sync_engine::session::SessionRegistry;
use mt5_sync_engine::store::{DataStore, RestStore};
use mt5_sync_engine::terminal::{SimTerminal, Terminal, TerminalLifecycle};
use mt5_sync_engine::worker::{HealthBoard, Worker};
use tokio_cron_scheduler::JobScheduler;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mt5_sync_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env());

    // Data store client
    let store: Arc<dyn DataStore> =
        match RestStore::new(&config.store_url, &config.store_service_key) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("❌ Failed to build data-store client: {}", e);
                return;
            }
        };

    // Credential cipher
    let cipher: Arc<dyn CredentialCipher> = match AesGcmCipher::from_hex_key(&config.encryption_key)
    {
        Ok(cipher) => Arc::new(cipher),
        Err(e) => {
            tracing::error!("❌ ENCRYPTION_KEY rejected: {}", e);
            return;
        }
    };

    // Shared scheduling core
    let registry = Arc::new(SessionRegistry::new());
    let queue = Arc::new(SyncQueue::new());
    let disabled = Arc::new(DisabledAccounts::new());
    let health = Arc::new(HealthBoard::new());
    let scheduler = Arc::new(SyncScheduler::new(
        registry,
        queue.clone(),
        store.clone(),
        disabled.clone(),
        config.clone(),
    ));

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    // Grace sweep on the cron scheduler
    let mut cron = match JobScheduler::new().await {
        Ok(cron) => cron,
        Err(e) => {
            tracing::error!("❌ Failed to create cron scheduler: {}", e);
            return;
        }
    };
    if let Err(e) = scheduler.register_grace_sweep(&cron).await {
        tracing::error!("❌ Failed to register grace sweep: {}", e);
        return;
    }
    if let Err(e) = cron.start().await {
        tracing::error!("❌ Failed to start cron scheduler: {}", e);
        return;
    }

    // Queue builder loop
    tracker.spawn(scheduler.clone().run_queue_builder(cancel.clone()));

    // Worker slots, one terminal each
    for slot in 1..=config.worker_slots {
        let terminal: Box<dyn Terminal> = match config.terminal_backend.as_str() {
            "sim" => Box::new(SimTerminal::demo()),
            other => {
                tracing::error!("❌ Unknown terminal backend '{}'", other);
                return;
            }
        };
        let lifecycle = TerminalLifecycle::new(terminal, config.terminal_path(slot));
        let breaker = LoginFailureBreaker::new(
            BreakerConfig::default(),
            store.clone(),
            disabled.clone(),
        );
        let worker = Worker::new(
            slot,
            lifecycle,
            queue.clone(),
            store.clone(),
            cipher.clone(),
            breaker,
            health.clone(),
            config.clone(),
        );
        tracker.spawn(worker.run(cancel.clone()));
    }
    tracker.close();

    // HTTP/WebSocket server
    let app = create_router(scheduler.clone(), health.clone());
    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("❌ Failed to bind {}: {}", config.bind_addr, e);
            return;
        }
    };

    tracing::info!("🚀 Sync engine running on http://{}", config.bind_addr);
    tracing::info!("🔌 Control channel: ws://{}/ws?token=<jwt>", config.bind_addr);
    tracing::info!("📊 Liveness: http://{}/health", config.bind_addr);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", config.bind_addr);
    tracing::info!(
        "⚙️  {} worker slots, sync interval {}s, grace period {}s",
        config.worker_slots,
        config.sync_interval_secs,
        config.grace_period_secs
    );

    let shutdown_token = cancel.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown_token.cancel();
        })
        .await;

    if let Err(e) = serve_result {
        tracing::error!("❌ Server error: {}", e);
        cancel.cancel();
    }

    // Drain background tasks and stop the cron scheduler
    tracker.wait().await;
    if let Err(e) = cron.shutdown().await {
        tracing::warn!("cron scheduler shutdown failed: {}", e);
    }
    tracing::info!("sync engine stopped");
}
