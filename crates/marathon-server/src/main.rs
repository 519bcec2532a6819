mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;

use marathon_db::{Database, RetryPolicy, SqliteStore};
use marathon_engine::{
    LogNotifier, NotificationEvaluator, Notifier, RotationEngine, Service, WebhookNotifier,
    scheduler,
};
use marathon_types::{Clock, SystemClock};

use crate::config::Config;
use crate::routes::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marathon=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;
    info!(?config, "Configuration loaded");

    // Init database
    let db = Database::open(&config.db_path)?;
    let policy = RetryPolicy::default()
        .with_max_attempts(config.retry_attempts)
        .with_timeout(Some(config.op_timeout));
    let store = Arc::new(SqliteStore::new(Arc::new(db), policy));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook {
        Some(url) => {
            info!("Reminders are delivered to {}", url);
            Arc::new(WebhookNotifier::new(url.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    let rotation = Arc::new(RotationEngine::new(store.clone(), store.clone()));
    let notifications = Arc::new(NotificationEvaluator::new(
        store.clone(),
        store.clone(),
        notifier,
    ));

    // Hourly batches
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let scheduler = config.scheduler.then(|| {
        tokio::spawn(scheduler::run(
            rotation.clone(),
            notifications.clone(),
            clock.clone(),
            config.freeze_window,
            async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            },
        ))
    });

    let state = Arc::new(AppStateInner {
        service: Service::new(
            store.clone(),
            store,
            clock.clone(),
            config.default_rotation_hour,
        ),
        rotation,
        notifications,
        clock,
        freeze_window: config.freeze_window,
        trigger_token: config.trigger_token.clone(),
    });

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Marathon server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    let _ = stop_tx.send(true);
    if let Some(handle) = scheduler {
        handle.await?;
    }

    Ok(())
}
