//! Prometheus metrics endpoint.

use crate::server::DropRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<DropRelay>>) -> impl IntoResponse {
    let m = relay.metrics();

    // Gauges
    let live = relay.service().live_count().await.unwrap_or(0);
    let tracked_send_ips = relay.rate_limits().send_keys_count();
    let tracked_receive_ips = relay.rate_limits().receive_keys_count();

    // Counters
    let texts_sent = m.texts_sent.load(Ordering::Relaxed);
    let texts_received = m.texts_received.load(Ordering::Relaxed);
    let photos_sent = m.photos_sent.load(Ordering::Relaxed);
    let photos_received = m.photos_received.load(Ordering::Relaxed);
    let photo_bytes = m.photo_bytes_received.load(Ordering::Relaxed);
    let validation = m.validation_failures.load(Ordering::Relaxed);
    let not_found = m.not_found_total.load(Ordering::Relaxed);
    let generation = m.generation_failures.load(Ordering::Relaxed);
    let cleanup = m.cleanup_failures.load(Ordering::Relaxed);
    let expired = m.records_expired.load(Ordering::Relaxed);
    let orphans = m.orphans_reclaimed.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP codedrop_transfers_live Transfers waiting to be received
# TYPE codedrop_transfers_live gauge
codedrop_transfers_live {live}

# HELP codedrop_rate_limit_tracked_ips Client IPs tracked by the rate limiters
# TYPE codedrop_rate_limit_tracked_ips gauge
codedrop_rate_limit_tracked_ips{{action="send"}} {tracked_send_ips}
codedrop_rate_limit_tracked_ips{{action="receive"}} {tracked_receive_ips}

# HELP codedrop_info Server information
# TYPE codedrop_info gauge
codedrop_info{{version="{version}"}} 1

# HELP codedrop_sent_total Transfers created
# TYPE codedrop_sent_total counter
codedrop_sent_total{{kind="text"}} {texts_sent}
codedrop_sent_total{{kind="photo"}} {photos_sent}

# HELP codedrop_received_total Transfers consumed
# TYPE codedrop_received_total counter
codedrop_received_total{{kind="text"}} {texts_received}
codedrop_received_total{{kind="photo"}} {photos_received}

# HELP codedrop_photo_bytes_received_total Photo bytes accepted
# TYPE codedrop_photo_bytes_received_total counter
codedrop_photo_bytes_received_total {photo_bytes}

# HELP codedrop_validation_failures_total Requests rejected by validation
# TYPE codedrop_validation_failures_total counter
codedrop_validation_failures_total {validation}

# HELP codedrop_not_found_total Receives for unknown, expired, or consumed codes
# TYPE codedrop_not_found_total counter
codedrop_not_found_total {not_found}

# HELP codedrop_generation_failures_total Sends that could not allocate a code
# TYPE codedrop_generation_failures_total counter
codedrop_generation_failures_total {generation}

# HELP codedrop_cleanup_failures_total Blob deletes that failed
# TYPE codedrop_cleanup_failures_total counter
codedrop_cleanup_failures_total {cleanup}

# HELP codedrop_records_expired_total Expired records removed by the sweeper
# TYPE codedrop_records_expired_total counter
codedrop_records_expired_total {expired}

# HELP codedrop_orphans_reclaimed_total Ownerless blobs deleted by the sweeper
# TYPE codedrop_orphans_reclaimed_total counter
codedrop_orphans_reclaimed_total {orphans}

# HELP codedrop_rate_limit_hits_total Total rate limit rejections
# TYPE codedrop_rate_limit_hits_total counter
codedrop_rate_limit_hits_total {rate_limits}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
