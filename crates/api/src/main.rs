use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use soilwatch_core::alert::{AlertConfig, AlertEngine};
use soilwatch_core::clock::{Clock, SystemClock};
use soilwatch_db::PgReadingSink;
use soilwatch_events::buffer::DEFAULT_CAPACITY;
use soilwatch_events::{DistributionBuffer, TelegramConfig, TelegramDelivery};
use soilwatch_mqtt::{Ingestor, MqttClient, MqttConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use soilwatch_api::config::ServerConfig;
use soilwatch_api::router::build_app_router;
use soilwatch_api::state::AppState;

const DEFAULT_LOG_FILTER: &str =
    "soilwatch_api=debug,soilwatch_mqtt=debug,soilwatch_events=info,soilwatch_core=info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = soilwatch_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    soilwatch_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    soilwatch_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Alerts ---
    let telegram = TelegramDelivery::new(TelegramConfig::from_env()?)
        .context("Failed to build Telegram client")?;
    tracing::info!(chat_id = telegram.chat_id(), "Telegram notifications enabled");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let alert_config = AlertConfig::from_env();
    tracing::info!(
        cooldown_secs = alert_config.cooldown.num_seconds(),
        "Alert engine configured"
    );
    let alerts = Arc::new(AlertEngine::new(
        alert_config,
        Arc::new(telegram),
        Arc::clone(&clock),
    ));

    // --- Ingestion + broker ---
    let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
    let ingestor = Arc::new(Ingestor::new(
        Arc::new(PgReadingSink::new(pool.clone())),
        alerts,
        Arc::clone(&buffer),
        clock,
    ));

    let mqtt = MqttClient::connect(MqttConfig::from_env(), ingestor, Arc::clone(&buffer))
        .await
        .context("Failed to connect to MQTT broker")?;

    // --- App state + router ---
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        buffer: Arc::clone(&buffer),
        mqtt: Arc::clone(&mqtt),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!(%addr, "Starting server");

    let shutdown = CancellationToken::new();
    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let mut server = tokio::spawn(async move { serve.await });

    tokio::select! {
        () = shutdown_signal() => {}
        result = &mut server => {
            tracing::error!(?result, "Server exited before shutdown was requested");
        }
    }

    // --- Ordered shutdown ---
    // SSE streams only finish once the buffer is closed, so close it before
    // waiting on the server to drain.
    shutdown.cancel();
    buffer.close();

    if !server.is_finished() {
        let drain = Duration::from_secs(config.shutdown_timeout_secs);
        match tokio::time::timeout(drain, &mut server).await {
            Ok(Ok(Ok(()))) => tracing::info!("HTTP server stopped"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server error during shutdown"),
            Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task failed"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = config.shutdown_timeout_secs,
                    "HTTP server did not drain in time, abandoning open connections"
                );
                server.abort();
            }
        }
    }

    mqtt.shutdown().await;

    pool.close().await;
    tracing::info!("Database pool closed");

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// JSON lines.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
