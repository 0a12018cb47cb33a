//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (document store, queue, config)
//! - `routes/`: HTTP routes + handlers (one file per domain)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router from the environment (used by `main.rs`).
pub async fn build_app() -> anyhow::Result<Router> {
    let services = services::build_services().await?;
    Ok(build_router(Arc::new(services)))
}

/// Build the router over already-wired services.
pub fn build_router(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(Extension(services)),
        )
}
