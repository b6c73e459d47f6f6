//! Transfer endpoints.
//!
//! Thin JSON wrappers over [`crate::service::TransferService`]. Each
//! request is checked against the rate limiters before the service runs.

use crate::error::TransferError;
use crate::limits::{Action, RateLimitError};
use crate::server::DropRelay;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use bytes::Bytes;
use drop_types::FetchHandle;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Routes for sending, receiving, and fetching transfers.
pub fn routes() -> Router {
    Router::new()
        .route("/api/text", post(send_text))
        .route("/api/text/receive", post(receive_text))
        .route("/api/photo", post(send_photo))
        .route("/api/photo/receive", post(receive_photo))
        .route("/blobs/:token", get(fetch_blob))
}

/// Body of `POST /api/text`.
#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    /// Text to share.
    pub text: String,
}

/// Body of the receive endpoints.
#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    /// Code as typed by the receiver.
    pub code: String,
}

/// Reply to a send.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// Code to share.
    pub code: String,
    /// Expiry in milliseconds since the epoch.
    pub expires_at: i64,
}

/// Reply to a text receive.
#[derive(Debug, Serialize)]
pub struct TextResponse {
    /// The shared text.
    pub text: String,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

/// Failure of an HTTP transfer request.
#[derive(Debug)]
pub enum ApiError {
    /// The service rejected or failed the request.
    Transfer(TransferError),
    /// A rate limiter rejected the request.
    RateLimited(RateLimitError),
    /// The request body could not be read.
    BadRequest(String),
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(e: RateLimitError) -> Self {
        Self::RateLimited(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::RateLimited(e) => (StatusCode::TOO_MANY_REQUESTS, e.to_string()),
            Self::Transfer(e) => match e {
                TransferError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
                TransferError::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
                TransferError::GenerationFailed(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "no transfer code available, try again".to_string(),
                ),
                TransferError::PhotoUnavailable(_) => (
                    StatusCode::BAD_GATEWAY,
                    "photo is no longer available".to_string(),
                ),
                TransferError::UploadFailed(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "photo upload failed".to_string(),
                ),
                TransferError::RegistrationFailed(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "photo registration failed".to_string(),
                ),
                TransferError::Storage(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal storage error".to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Client address, or the unspecified address when the server was not
/// started with connect info (as in tests).
fn client_ip(connect: Option<ConnectInfo<SocketAddr>>) -> IpAddr {
    connect
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn check_limits(relay: &DropRelay, action: Action, ip: IpAddr) -> Result<(), ApiError> {
    relay.rate_limits().check(action, ip).map_err(|e| {
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Rate limited {}: {}", ip, e);
        ApiError::from(e)
    })
}

async fn send_text(
    Extension(relay): Extension<Arc<DropRelay>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<SendTextRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SendResponse>), ApiError> {
    check_limits(&relay, Action::Send, client_ip(connect))?;
    let Json(request) = body?;

    let issued = relay.service().send_text(&request.text).await?;
    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            code: issued.code.to_string(),
            expires_at: issued.expires_at.as_millis(),
        }),
    ))
}

async fn receive_text(
    Extension(relay): Extension<Arc<DropRelay>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<ReceiveRequest>, JsonRejection>,
) -> Result<Json<TextResponse>, ApiError> {
    check_limits(&relay, Action::Receive, client_ip(connect))?;
    let Json(request) = body?;

    let text = relay.service().receive_text(&request.code).await?;
    Ok(Json(TextResponse { text }))
}

async fn send_photo(
    Extension(relay): Extension<Arc<DropRelay>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<SendResponse>), ApiError> {
    check_limits(&relay, Action::Send, client_ip(connect))?;

    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let declared_size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(body.len() as u64);

    let issued = relay
        .service()
        .send_photo(body, mime_type, declared_size)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            code: issued.code.to_string(),
            expires_at: issued.expires_at.as_millis(),
        }),
    ))
}

async fn receive_photo(
    Extension(relay): Extension<Arc<DropRelay>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<ReceiveRequest>, JsonRejection>,
) -> Result<Json<FetchHandle>, ApiError> {
    check_limits(&relay, Action::Receive, client_ip(connect))?;
    let Json(request) = body?;

    let handle = relay.service().receive_photo(&request.code).await?;
    Ok(Json(handle))
}

async fn fetch_blob(
    Extension(relay): Extension<Arc<DropRelay>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    relay.rate_limits().check_global()?;

    let staged = relay
        .service()
        .open_handle(&token)
        .ok_or(ApiError::Transfer(TransferError::NotFound))?;
    Ok((
        [
            (CONTENT_TYPE, staged.content_type),
            (CACHE_CONTROL, "no-store".to_string()),
        ],
        staged.bytes,
    )
        .into_response())
}
