//! Stripe webhook endpoint: verifies the `Stripe-Signature` header against
//! the configured secret, then hands the parsed event to
//! [`reservations::handle_stripe_event`].

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use common::AppError;

use crate::errors::reservation_error;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(stripe_webhook))
}

async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode, AppError> {
    let secret = &state.webhook_secrets.stripe;
    if secret.is_empty() {
        return Err(AppError::BadRequest("STRIPE_WEBHOOK_SECRET not set".to_string()));
    }

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing stripe-signature header".to_string()))?;

    if !reservations::verify_signature(&body, signature, secret) {
        return Err(AppError::Unauthorized("stripe signature verification failed".to_string()));
    }

    let event: reservations::StripeEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    reservations::handle_stripe_event(&state.reservations, event)
        .await
        .map_err(reservation_error)?;

    Ok(StatusCode::OK)
}
