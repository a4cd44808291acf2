//! Stripe webhook ingestion: signature verification, event-id idempotency,
//! and the handlers that drive booking confirmation/refund state from
//! payment-processor callbacks rather than a client-initiated request.

use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use db::models::booking::payment_status;

use crate::context::ReservationContext;
use crate::error::ReservationError;

const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventObject {
    pub id: String,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Verifies Stripe's `Stripe-Signature` header: `t=<unix ts>,v1=<hex hmac>`
/// over `"{ts}.{payload}"`, rejecting anything outside a 5-minute clock
/// skew tolerance the same way Stripe's own libraries do.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> bool {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = Some(v),
            (Some("v1"), Some(v)) => signature = Some(v),
            _ => {}
        }
    }

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (Utc::now().timestamp() - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Dispatches one verified Stripe event. Returns `Ok(())` for event types
/// this crate doesn't act on (Stripe sends far more than the three this
/// flow cares about) and for events already processed.
pub async fn handle_stripe_event(ctx: &ReservationContext, event: StripeEvent) -> Result<(), ReservationError> {
    // Stripe's own 24h event-retry window is exactly what `SeenStore`'s
    // "seen" TTL already models for channel webhooks, so this reuses it
    // rather than carrying a second dedup mechanism.
    let idem_key = format!("stripe:{}", event.id);
    let unseen = ctx
        .seen
        .mark_if_unseen(&idem_key)
        .await
        .map_err(|e| ReservationError::Database(sqlx::Error::Protocol(e.to_string())))?;
    if !unseen {
        return Ok(());
    }

    match event.event_type.as_str() {
        "payment_intent.succeeded" => handle_payment_succeeded(ctx, event.data.object).await,
        "payment_intent.payment_failed" => handle_payment_failed(ctx, event.data.object).await,
        "charge.refunded" => handle_charge_refunded(ctx, event.data.object).await,
        _ => Ok(()),
    }
}

async fn handle_payment_succeeded(ctx: &ReservationContext, object: StripeEventObject) -> Result<(), ReservationError> {
    let Some(booking) = ctx.reservations.find_by_payment_intent_id(&object.id).await? else {
        tracing::warn!(payment_intent_id = %object.id, "payment_intent.succeeded for unknown booking");
        return Ok(());
    };
    crate::booking::confirm_booking(ctx, booking.id, &object.id).await?;
    Ok(())
}

async fn handle_payment_failed(ctx: &ReservationContext, object: StripeEventObject) -> Result<(), ReservationError> {
    let Some(booking) = ctx.reservations.find_by_payment_intent_id(&object.id).await? else {
        tracing::warn!(payment_intent_id = %object.id, "payment_intent.payment_failed for unknown booking");
        return Ok(());
    };
    if booking.status == db::models::booking::booking_status::RESERVED {
        ctx.reservations
            .cancel(booking.id, payment_status::FAILED, Some("payment_failed"), Utc::now())
            .await?;
        ctx.calendar.release_booking(booking.id).await?;
    }
    Ok(())
}

async fn handle_charge_refunded(ctx: &ReservationContext, object: StripeEventObject) -> Result<(), ReservationError> {
    let Some(payment_intent_id) = object.payment_intent.as_deref() else {
        return Ok(());
    };
    if ctx.reservations.find_by_payment_intent_id(payment_intent_id).await?.is_none() {
        tracing::warn!(payment_intent_id = %payment_intent_id, "charge.refunded for unknown booking");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_rejects_wrong_secret() {
        let payload = b"{}";
        let ts = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(b"right-secret").unwrap();
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        let header = format!("t={ts},v1={sig}");

        assert!(verify_signature(payload, &header, "right-secret"));
        assert!(!verify_signature(payload, &header, "wrong-secret"));
    }

    #[test]
    fn signature_rejects_stale_timestamp() {
        let payload = b"{}";
        let ts = Utc::now().timestamp() - 1000;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        let header = format!("t={ts},v1={sig}");

        assert!(!verify_signature(payload, &header, "secret"));
    }

}
