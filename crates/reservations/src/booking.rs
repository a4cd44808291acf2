//! The direct-booking flow: create a tentative hold, confirm it against a
//! captured payment, or release it back to the calendar on cancellation or
//! expiry. Mirrors the inbound channel import's claim-then-commit shape,
//! but guards the claim with a distributed lock instead of relying solely
//! on the database's unique constraints, since a direct booking also needs
//! a consistent read of calendar pricing before it commits to a price.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use db::models::booking::{booking_status, payment_status, SOURCE_DIRECT};
use db::models::calendar_cell::cell_status;
use db::models::{CanonicalBooking, CreateCanonicalBooking, CreateGuest};
use db::repositories::CalendarCellRepository;

use crate::context::ReservationContext;
use crate::error::ReservationError;
use crate::pricing::{compute_breakdown, PropertyPricing};
use crate::refund::refund_amount;

const LOCK_TTL_MS: usize = 60_000;
const LOCK_MAX_WAIT_MS: u64 = 5_000;
const LOCK_RETRY_INTERVAL_MS: u64 = 200;
const RESERVATION_HOLD_MINUTES: i64 = 30;

pub struct CreateBookingRequest {
    pub property_id: Uuid,
    pub guest_email: Option<String>,
    pub guest_name: String,
    pub guest_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub infants: i32,
}

pub struct CreateBookingOutcome {
    pub booking: CanonicalBooking,
    pub client_secret: Option<String>,
}

fn lock_key(property_id: Uuid, check_in: NaiveDate, check_out: NaiveDate) -> String {
    format!("booking:{property_id}:{check_in}:{check_out}")
}

async fn price_overrides(
    ctx: &ReservationContext,
    property_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<HashMap<NaiveDate, Decimal>, ReservationError> {
    let cells = ctx.calendar.list_range(property_id, check_in, check_out).await?;
    Ok(cells
        .into_iter()
        .filter_map(|cell| cell.price_override.map(|price| (cell.date, price)))
        .collect())
}

/// Creates a tentative, payment-pending booking and a matching payment
/// intent. Holds `lock_key` for the duration of the pricing read and the
/// calendar claim so two requests for overlapping dates never both compute
/// a price against the same unclaimed cells; `create_holding_calendar`'s
/// `claim_range` is the actual correctness guard against double-booking,
/// the lock only avoids wasted payment-intent creation under contention.
pub async fn create_booking(
    ctx: &ReservationContext,
    request: CreateBookingRequest,
) -> Result<CreateBookingOutcome, ReservationError> {
    if request.check_out <= request.check_in {
        return Err(ReservationError::DatesUnavailable);
    }

    let property = ctx
        .properties
        .find_by_id(request.property_id)
        .await?
        .filter(|p| p.is_active())
        .ok_or(ReservationError::NotFound(request.property_id))?;

    let handle = ctx
        .lock
        .acquire(
            &lock_key(request.property_id, request.check_in, request.check_out),
            LOCK_TTL_MS,
            LOCK_MAX_WAIT_MS,
            LOCK_RETRY_INTERVAL_MS,
        )
        .await
        .map_err(|_| ReservationError::LockContention)?;

    let result = create_booking_locked(ctx, &request, &property).await;
    ctx.lock.release(handle).await.ok();
    result
}

async fn create_booking_locked(
    ctx: &ReservationContext,
    request: &CreateBookingRequest,
    property: &db::models::Property,
) -> Result<CreateBookingOutcome, ReservationError> {
    let overrides = price_overrides(ctx, property.id, request.check_in, request.check_out).await?;
    let pricing = PropertyPricing {
        base_price: property.base_price,
        cleaning_fee: property.cleaning_fee,
        tax_rate: property.tax_rate,
        tax_included: property.tax_included,
    };
    let breakdown = compute_breakdown(request.check_in, request.check_out, &pricing, &overrides);

    let guest = ctx
        .guests
        .find_or_create(CreateGuest {
            tenant_id: property.id,
            email: request.guest_email.clone(),
            full_name: request.guest_name.clone(),
            phone: request.guest_phone.clone(),
        })
        .await?;

    let reference = ctx.reservations.next_booking_reference(Utc::now().year()).await?;

    let intent = ctx
        .payments
        .create_payment_intent(breakdown.total, &property.currency, &reference)
        .await?;

    let now = Utc::now();
    let expires_at = now + chrono::Duration::minutes(RESERVATION_HOLD_MINUTES);

    let claimed = ctx
        .reservations
        .create_holding_calendar(CreateCanonicalBooking {
            property_id: property.id,
            guest_id: guest.id,
            source: SOURCE_DIRECT.to_string(),
            channel_booking_id: None,
            booking_reference: Some(reference),
            check_in_date: request.check_in,
            check_out_date: request.check_out,
            adults: request.adults,
            children: request.children,
            infants: request.infants,
            nightly_rate: breakdown.nightly_rate,
            subtotal: breakdown.subtotal,
            fees: breakdown.cleaning_fee + breakdown.service_fee,
            taxes: breakdown.taxes,
            total: breakdown.total,
            currency: property.currency.clone(),
            status: booking_status::RESERVED.to_string(),
            payment_status: payment_status::PENDING.to_string(),
            payment_intent_id: Some(intent.id.clone()),
            expires_at: Some(expires_at),
            channel_payload: None,
        })
        .await?;

    let Some(booking) = claimed else {
        if let Err(e) = ctx.payments.cancel_payment_intent(&intent.id).await {
            tracing::warn!(payment_intent_id = %intent.id, error = %e, "failed to cancel payment intent after lost calendar claim");
        }
        return Err(ReservationError::DatesUnavailable);
    };

    Ok(CreateBookingOutcome {
        booking,
        client_secret: intent.client_secret,
    })
}

/// Confirms a reservation once its payment intent has succeeded. Idempotent:
/// calling this twice with the same `payment_intent_id` for an already
/// confirmed booking returns the existing row rather than erroring.
pub async fn confirm_booking(
    ctx: &ReservationContext,
    booking_id: Uuid,
    payment_intent_id: &str,
) -> Result<CanonicalBooking, ReservationError> {
    let booking = ctx
        .reservations
        .find_by_id(booking_id)
        .await?
        .ok_or(ReservationError::NotFound(booking_id))?;

    if booking.status == booking_status::CONFIRMED {
        if booking.payment_intent_id.as_deref() == Some(payment_intent_id) {
            return Ok(booking);
        }
        return Err(ReservationError::InvalidTransition(booking_id, booking.status, "confirmed"));
    }

    if booking.status != booking_status::RESERVED {
        return Err(ReservationError::InvalidTransition(booking_id, booking.status, "confirmed"));
    }

    if booking.payment_intent_id.as_deref() != Some(payment_intent_id) {
        return Err(ReservationError::InvalidTransition(booking_id, booking.status, "confirmed"));
    }

    let intent = ctx.payments.retrieve_payment_intent(payment_intent_id).await?;
    if intent.status != crate::payment::PAYMENT_INTENT_SUCCEEDED {
        return Err(ReservationError::Payment(crate::error::PaymentError::NotSucceeded(
            payment_intent_id.to_string(),
        )));
    }
    let paid_amount = intent.amount_received.unwrap_or(booking.total);

    let now = Utc::now();
    let confirmed = ctx
        .reservations
        .confirm(booking_id, paid_amount, now)
        .await?
        .ok_or_else(|| ReservationError::InvalidTransition(booking_id, booking.status.clone(), "confirmed"))?;

    let mut tx = ctx.pool.begin().await?;
    CalendarCellRepository::mark_range_status(
        &mut tx,
        confirmed.property_id,
        confirmed.check_in_date,
        confirmed.check_out_date,
        confirmed.id,
        cell_status::BOOKED,
    )
    .await?;
    tx.commit().await?;

    let event = sync_engine::BookingLifecycleEvent {
        property_id: confirmed.property_id,
        source: SOURCE_DIRECT.to_string(),
        check_in: confirmed.check_in_date,
        check_out: confirmed.check_out_date,
    };
    let mut events = ctx.events.clone();
    if let Err(e) = sync_engine::publish_booking_confirmed(&mut events, &event).await {
        tracing::error!(booking_id = %confirmed.id, error = %e, "failed to publish booking_confirmed event");
    }

    Ok(confirmed)
}

/// Cancels a booking under the moderate refund policy, releases its
/// calendar hold, and issues the computed refund against the captured
/// payment (a no-op amount still records the cancellation).
pub async fn cancel_booking(
    ctx: &ReservationContext,
    booking_id: Uuid,
    reason: Option<String>,
) -> Result<CanonicalBooking, ReservationError> {
    let booking = ctx
        .reservations
        .find_by_id(booking_id)
        .await?
        .ok_or(ReservationError::NotFound(booking_id))?;

    if !booking.holds_calendar() {
        return Err(ReservationError::InvalidTransition(booking_id, booking.status, "cancelled"));
    }

    let today = Utc::now().date_naive();
    let refund = if booking.payment_status == payment_status::PAID {
        refund_amount(booking.paid_amount.unwrap_or(booking.total), booking.check_in_date, today)
    } else {
        Decimal::ZERO
    };

    if refund > Decimal::ZERO {
        if let Some(payment_intent_id) = booking.payment_intent_id.as_deref() {
            ctx.payments.refund(payment_intent_id, refund).await?;
        }
    }

    let payment_status = if !refund.is_zero() && booking.paid_amount.map(|paid| refund < paid).unwrap_or(false) {
        payment_status::PARTIALLY_REFUNDED
    } else if !refund.is_zero() {
        payment_status::REFUNDED
    } else {
        booking.payment_status.clone()
    };

    let cancelled = ctx
        .reservations
        .cancel(booking_id, payment_status, reason.as_deref(), Utc::now())
        .await?;
    ctx.calendar.release_booking(booking_id).await?;

    let event = sync_engine::BookingLifecycleEvent {
        property_id: cancelled.property_id,
        source: SOURCE_DIRECT.to_string(),
        check_in: cancelled.check_in_date,
        check_out: cancelled.check_out_date,
    };
    let mut events = ctx.events.clone();
    if let Err(e) = sync_engine::publish_booking_cancelled(&mut events, &event).await {
        tracing::error!(booking_id = %cancelled.id, error = %e, "failed to publish booking_cancelled event");
    }

    Ok(cancelled)
}

/// Read-only availability check for the dates a prospective booking would
/// claim. A date with no calendar-cell row yet is treated as free — rows
/// are created lazily by the first write (a channel sync, a manual block,
/// or a claim), not eagerly for every property/date pair.
pub async fn check_availability(
    ctx: &ReservationContext,
    property_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<bool, ReservationError> {
    if check_out <= check_in {
        return Ok(false);
    }
    let cells = ctx.calendar.list_range(property_id, check_in, check_out).await?;
    let blocked_dates: HashMap<NaiveDate, bool> = cells.iter().map(|cell| (cell.date, cell.is_free())).collect();

    let mut date = check_in;
    while date < check_out {
        if !blocked_dates.get(&date).copied().unwrap_or(true) {
            return Ok(false);
        }
        date += chrono::Duration::days(1);
    }
    Ok(true)
}

/// Sweeps reservations whose hold expired without a captured payment;
/// called from a scheduled beat, not the HTTP API. Cancellation of the
/// payment intent is best-effort — Stripe's own expiry handles the rest.
pub async fn expire_stale_reservations(ctx: &ReservationContext) -> Result<usize, ReservationError> {
    let expired = ctx.reservations.expire_stale_reservations().await?;
    for (booking_id, payment_intent_id) in &expired {
        ctx.calendar.release_booking(*booking_id).await?;
        if let Some(payment_intent_id) = payment_intent_id {
            if let Err(e) = ctx.payments.cancel_payment_intent(payment_intent_id).await {
                tracing::warn!(booking_id = %booking_id, payment_intent_id, error = %e, "failed to cancel payment intent for expired reservation");
            }
        }
    }
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_scopes_by_property_and_date_range() {
        let property_id = Uuid::nil();
        let key = lock_key(
            property_id,
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 13).unwrap(),
        );
        assert_eq!(key, format!("booking:{property_id}:2026-08-10:2026-08-13"));
    }
}
