//! Health check endpoint.

use crate::server::DropRelay;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Transfers currently waiting to be received.
    pub live_transfers: u64,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
///
/// Reports 503 if the record store cannot be queried.
pub async fn health_handler(
    Extension(relay): Extension<Arc<DropRelay>>,
) -> (StatusCode, Json<HealthStatus>) {
    let (status, code, live) = match relay.service().live_count().await {
        Ok(live) => ("ok", StatusCode::OK, live),
        Err(e) => {
            tracing::error!("Health check storage query failed: {}", e);
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, 0)
        }
    };

    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            live_transfers: live,
            uptime_seconds: relay.uptime().as_secs(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serializes() {
        let status = HealthStatus {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            live_transfers: 42,
            uptime_seconds: 3600,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"live_transfers\":42"));
    }
}
