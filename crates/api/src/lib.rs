//! HTTP services for the four saga participants.
//!
//! One process serves one participant role under `/api/v1`, with `/health`
//! and `/metrics` alongside, structured logging (tracing) and Prometheus
//! metrics. The role's outbox publisher runs as a background task in the
//! same process (wired up in `main`).

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::TargetService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Routes owned by one participant role.
fn api_routes(role: TargetService) -> Router<AppState> {
    match role {
        TargetService::Order => Router::new()
            .route("/order/start", post(routes::order::start))
            .route("/order/compensate", post(routes::order::compensate))
            .route("/order/{order_id}", get(routes::order::get)),
        TargetService::Payment => Router::new()
            .route("/payment/process", post(routes::payment::process))
            .route("/payment/refund", post(routes::payment::refund))
            .route("/payment/{payment_id}", get(routes::payment::get)),
        TargetService::Inventory => Router::new()
            .route("/inventory/update", post(routes::inventory::update))
            .route("/inventory/compensate", post(routes::inventory::compensate))
            .route("/inventory/initialize", post(routes::inventory::initialize))
            .route("/inventory/{product_id}", get(routes::inventory::get)),
        TargetService::Shipping => Router::new()
            .route("/shipping/deliver", post(routes::shipping::deliver))
            .route("/shipping/cancel", post(routes::shipping::cancel))
            .route("/shipping/{shipment_id}", get(routes::shipping::get)),
    }
}

/// Creates the Axum application for one participant role.
pub fn create_router(
    role: TargetService,
    state: AppState,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", api_routes(role))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
