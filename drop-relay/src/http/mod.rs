//! HTTP endpoints for codedrop-relay.
//!
//! Provides the transfer API, health checks, and metrics.

pub mod health;
mod metrics;
pub mod transfer;

use crate::server::DropRelay;
use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;
pub use transfer::ApiError;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<DropRelay>) -> Router {
    // Leave headroom over the photo limit so oversized uploads reach
    // validation and get a descriptive 400 instead of a bare 413.
    let body_limit = usize::try_from(relay.service().policy().max_photo_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2);

    Router::new()
        .merge(transfer::routes())
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(relay))
}
