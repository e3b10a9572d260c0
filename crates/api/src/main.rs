//! Participant service entry point.
//!
//! Runs one participant role (selected by `SERVICE`) plus its outbox
//! publisher.

use std::sync::Arc;

use api::{AppState, Config};
use domain::{PaymentAuthorizer, SimulatedAuthorizer};
use outbox::OutboxPublisher;
use sqlx::postgres::PgPoolOptions;
use store::InMemoryBackend;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Load configuration and build the store stack
    let config = Config::from_env();
    let authorizer: Arc<dyn PaymentAuthorizer> =
        Arc::new(SimulatedAuthorizer::new(config.payment_failure_rate));

    let state = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(url)
                .await
                .expect("failed to connect to database");
            store::run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            AppState::with_postgres(pool, authorizer, config.publisher.max_retries)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; state will not survive a restart");
            AppState::with_memory_backend(
                InMemoryBackend::new(),
                authorizer,
                config.publisher.max_retries,
            )
        }
    };

    // 4. Start the outbox publisher for this service's outbox
    let publisher = OutboxPublisher::new(state.outbox.clone(), config.publisher.clone())
        .expect("failed to build outbox publisher");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let publisher_handle = tokio::spawn(async move { publisher.run(shutdown_rx).await });

    // 5. Serve the participant routes
    let app = api::create_router(config.service, state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, service = %config.service, "starting participant service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop the publisher after its in-flight dispatches complete
    let _ = shutdown_tx.send(true);
    let _ = publisher_handle.await;
    tracing::info!("server shut down gracefully");
}
