//! Inbound webhook ingress: one fixed URL per channel —
//! `POST /api/v1/webhooks/{airbnb|booking_com|expedia|fewo_direkt|google}`.
//! Each route verifies the signature, dedupes, resolves the connection the
//! event belongs to from the payload itself (no connection id in the URL —
//! vendors call a single callback they configured once), and dispatches the
//! actual import asynchronously so the handler returns well inside the
//! latency budget.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::AppError;
use serde::Serialize;
use utoipa::ToSchema;

use sync_engine::idempotency::derive_key;
use sync_engine::tasks::TaskQueue;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(crate::routes::health::health))
        .route("/airbnb", post(airbnb_webhook))
        .route("/booking_com", post(booking_com_webhook))
        .route("/expedia", post(expedia_webhook))
        .route("/fewo_direkt", post(fewo_direkt_webhook))
        .route("/google", post(google_webhook))
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Accepted,
    AlreadyProcessed,
    Skipped,
}

#[derive(Serialize, ToSchema)]
pub struct WebhookResponse {
    pub status: WebhookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl WebhookResponse {
    fn accepted(event_id: String) -> Self {
        Self { status: WebhookStatus::Accepted, event_id: Some(event_id) }
    }
    fn already_processed() -> Self {
        Self { status: WebhookStatus::AlreadyProcessed, event_id: None }
    }
    fn skipped() -> Self {
        Self { status: WebhookStatus::Skipped, event_id: None }
    }
}

const AIRBNB_SIGNATURE_HEADER: &str = "x-airbnb-signature";
const BOOKING_SIGNATURE_HEADER: &str = "x-booking-signature";
const EXPEDIA_SIGNATURE_HEADER: &str = "x-expedia-signature";
const VRBO_SIGNATURE_HEADER: &str = "x-vrbo-signature";

async fn airbnb_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    handle_channel_webhook(&state, db::models::channel_kind::AIRBNB, AIRBNB_SIGNATURE_HEADER, headers, body).await
}

async fn booking_com_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    handle_channel_webhook(&state, db::models::channel_kind::BOOKING_COM, BOOKING_SIGNATURE_HEADER, headers, body).await
}

async fn expedia_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    handle_channel_webhook(&state, db::models::channel_kind::EXPEDIA, EXPEDIA_SIGNATURE_HEADER, headers, body).await
}

async fn fewo_direkt_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    handle_channel_webhook(&state, db::models::channel_kind::FEWO_DIREKT, VRBO_SIGNATURE_HEADER, headers, body).await
}

/// Steps 1-7 of the webhook contract, shared by every HMAC-signed channel.
/// Google is handled separately below: it authenticates with a bearer JWT
/// over a Pub/Sub push envelope rather than a body signature.
async fn handle_channel_webhook(
    state: &AppState,
    channel: &str,
    signature_header: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let started = Instant::now();

    let verified = verify_signature(state, channel, signature_header, &headers, &body)?;
    if !verified {
        record_received(channel, "invalid_signature");
        record_duration(channel, started);
        return Err(AppError::Unauthorized("signature verification failed".to_string()));
    }

    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        record_received(channel, "invalid_body");
        record_duration(channel, started);
        AppError::BadRequest(e.to_string())
    })?;

    let adapter = sync_engine::registry::adapter_for(channel, "", None)
        .ok_or_else(|| AppError::BadRequest(format!("unknown channel {channel}")))?;

    let event = adapter
        .parse_webhook_event(payload)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let response = dispatch_event(state, &event).await?;
    record_received(channel, status_label(&response.status));
    record_duration(channel, started);
    Ok(Json(response))
}

/// Pub/Sub push subscriptions authenticate with a bearer token configured
/// at subscription-creation time rather than a per-message signature, so
/// this route checks that token instead of going through the JWT path
/// `ChannelAdapter::verify_webhook_signature` expects (that path additionally
/// needs a populated JWKS cache, refreshed out of band).
async fn google_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let started = Instant::now();
    let channel = db::models::channel_kind::GOOGLE;

    let expected = &state.webhook_secrets.google_bearer_token;
    if expected.is_empty() {
        return Err(AppError::BadRequest("GOOGLE_WEBHOOK_BEARER_TOKEN not set".to_string()));
    }
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided != Some(expected.as_str()) {
        record_received(channel, "invalid_signature");
        record_duration(channel, started);
        return Err(AppError::Unauthorized("bearer token mismatch".to_string()));
    }

    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        record_received(channel, "invalid_body");
        record_duration(channel, started);
        AppError::BadRequest(e.to_string())
    })?;

    let adapter = sync_engine::registry::adapter_for(channel, "", None)
        .ok_or_else(|| AppError::BadRequest("google adapter unavailable".to_string()))?;

    let event = adapter
        .parse_webhook_event(payload)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    // Per the contract, Google's idempotency key defaults to the Pub/Sub
    // envelope's `message.messageId` — the adapter already carries that
    // into `event_id` rather than anything decoded from `message.data`.
    if event.event_id.is_empty() {
        return Err(AppError::BadRequest("pub/sub envelope missing message id".to_string()));
    }

    let response = dispatch_event(&state, &event).await?;
    record_received(channel, status_label(&response.status));
    record_duration(channel, started);
    Ok(Json(response))
}

/// Verifies the payload against the channel's static secret using that
/// channel's own adapter — `verify_webhook_signature` is pure with respect
/// to the access token, so a throwaway adapter built with an empty token is
/// enough to check a signature. A missing header is accepted when no
/// secret is configured for the channel (configuration-gated per the
/// contract), and rejected when one is.
fn verify_signature(
    state: &AppState,
    channel: &str,
    signature_header: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<bool, AppError> {
    let secret = state.webhook_secrets.for_channel(channel).filter(|s| !s.is_empty());
    let Some(secret) = secret else {
        return Ok(true);
    };

    let Some(signature) = headers.get(signature_header).and_then(|v| v.to_str().ok()) else {
        return Ok(false);
    };

    let adapter = sync_engine::registry::adapter_for(channel, "", None)
        .ok_or_else(|| AppError::BadRequest(format!("unknown channel {channel}")))?;
    adapter
        .verify_webhook_signature(body, signature, secret)
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Steps 4-7: idempotency key, connection resolution, and asynchronous
/// dispatch into the sync engine's import path.
async fn dispatch_event(
    state: &AppState,
    event: &db::models::WebhookEvent,
) -> Result<WebhookResponse, AppError> {
    // The contract's key is `sha256(channel || reservation_id || booking_id
    // || updated_at || event_id)`; this domain's webhook payloads carry a
    // single vendor id rather than separate reservation/booking ids, so it
    // stands in for both.
    let updated_at = event.occurred_at.to_rfc3339();
    let idem_key = derive_key(&[&event.channel_kind, &event.event_id, &updated_at, &event.event_id]);

    let unseen = state
        .sync
        .seen
        .mark_if_unseen(&idem_key)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !unseen {
        return Ok(WebhookResponse::already_processed());
    }

    let connection = state
        .sync
        .connections
        .find_by_remote_property(&event.channel_kind, &event.remote_property_id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let Some(connection) = connection else {
        return Ok(WebhookResponse::skipped());
    };

    enqueue_import(state, connection, event.event_id.clone()).await;
    Ok(WebhookResponse::accepted(event.event_id.clone()))
}

/// Fires the import off on the task queue so the HTTP handler returns
/// before the downstream fetch-and-import runs, per the webhook latency
/// budget.
async fn enqueue_import(state: &AppState, connection: db::models::ChannelConnection, channel_booking_id: String) {
    let sync = state.sync.clone();
    let tasks: Arc<dyn TaskQueue> = sync.tasks.clone();
    tasks
        .enqueue(Box::pin(async move {
            if let Err(e) = sync_engine::inbound::import_from_webhook(&sync, &connection, &channel_booking_id).await {
                tracing::warn!(
                    connection_id = %connection.id,
                    channel = %connection.channel_kind,
                    error = %e,
                    "webhook-triggered import failed",
                );
            }
        }))
        .await;
}

fn status_label(status: &WebhookStatus) -> &'static str {
    match status {
        WebhookStatus::Accepted => "accepted",
        WebhookStatus::AlreadyProcessed => "already_processed",
        WebhookStatus::Skipped => "skipped",
    }
}

fn record_received(channel: &str, status: &str) {
    metrics::register_counter!(
        "webhook_received_total",
        "channel" => channel.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

fn record_duration(channel: &str, started: Instant) {
    metrics::register_histogram!("webhook_processing_seconds", "channel" => channel.to_string())
        .record(started.elapsed().as_secs_f64());
}
