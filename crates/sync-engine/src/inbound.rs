//! Importing a remote platform's reservation into the canonical booking
//! table, and fanning the result back out to every other active channel.

use chrono::Utc;

use channels::ChannelAdapterError;
use db::models::booking::{booking_status, payment_status};
use db::models::sync_log::{sync_direction, sync_task_type};
use db::models::{ChannelConnection, CreateCanonicalBooking, CreateGuest, PlatformBooking, SyncLogDraft};

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::idempotency::derive_key;
use crate::outbound::BookingLifecycleEvent;
use crate::registry::adapter_for;

/// Entry point for webhook-driven imports. A webhook body rarely carries
/// the full reservation, only enough to identify it, so this re-fetches the
/// authoritative record before handing it to [`import_channel_booking`] —
/// which already tells creates, updates, and cancellations apart by
/// comparing against the existing row, so one path covers all three.
pub async fn import_from_webhook(
    ctx: &SyncContext,
    connection: &ChannelConnection,
    channel_booking_id: &str,
) -> Result<(), SyncError> {
    ctx.rate_limiter
        .acquire(&connection.channel_kind, &connection.id.to_string(), 1)
        .await?;
    ctx.circuit_breaker.admit(&connection.channel_kind).await?;

    let token = channels::decrypt_if_available(Some(&ctx.crypto), &connection.access_token_encrypted);
    let Some(adapter) = adapter_for(&connection.channel_kind, &token, Some(&connection.remote_property_id)) else {
        return Err(SyncError::ConnectionNotFound(connection.id));
    };

    match adapter.get_booking(&connection.remote_property_id, channel_booking_id).await {
        Ok(booking) => {
            ctx.circuit_breaker.record_success(&connection.channel_kind).await?;
            import_channel_booking(ctx, connection.id, booking).await
        }
        Err(err) => {
            if matches!(err, ChannelAdapterError::Authentication { .. }) {
                crate::token_refresh::refresh_connection_now(ctx, connection).await;
            } else {
                ctx.circuit_breaker.record_failure(&connection.channel_kind).await?;
            }
            Err(err.into())
        }
    }
}

/// Imports one remote booking for `connection`, idempotently.
///
/// 1. Short-circuits on the coordination-store "seen" set.
/// 2. If the booking is already known, updates status/payment in place —
///    the calendar hold it already created is left untouched.
/// 3. Otherwise resolves the guest, claims the calendar, and inserts the
///    canonical row; a claim conflict (a direct booking won the race) is
///    recorded as a skip, not a failure.
/// 4. Enqueues an outbound fan-out to every other connection on the
///    property so peer channels see the new hold.
pub async fn import_channel_booking(
    ctx: &SyncContext,
    connection_id: uuid::Uuid,
    platform_booking: PlatformBooking,
) -> Result<(), SyncError> {
    let mut draft = SyncLogDraft::new(connection_id, sync_task_type::BOOKING_IMPORT, sync_direction::INBOUND);
    draft.processed = 1;

    let Some(connection) = ctx.connections.find_by_id(connection_id).await? else {
        draft.failed = 1;
        draft.error_message = Some("connection not found".to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(SyncError::ConnectionNotFound(connection_id));
    };

    let updated_at = platform_booking.updated_at.to_rfc3339();
    let idem_key = derive_key(&[
        &platform_booking.channel_kind,
        &platform_booking.channel_booking_id,
        &updated_at,
    ]);

    if !ctx.seen.mark_if_unseen(&idem_key).await? {
        draft.skipped = 1;
        draft.error_message = Some("already_imported".to_string());
        ctx.sync_logs.finish(draft).await?;
        return Ok(());
    }

    let existing = ctx
        .reservations
        .find_by_channel_booking_id(&platform_booking.channel_kind, &platform_booking.channel_booking_id)
        .await?;

    let (booking, created) = match existing {
        Some(existing) => {
            // Out-of-order delivery is tolerated everywhere except here: a
            // cancelled booking never reopens from a stale update, even if
            // the stale event reports a later-sounding status.
            if existing.status == booking_status::CANCELLED {
                draft.skipped = 1;
                ctx.connections.record_attempt(connection_id, Utc::now()).await?;
                ctx.sync_logs.finish(draft).await?;
                return Ok(());
            }

            let mapped_status = map_status(&platform_booking.status);
            let updated = if mapped_status != existing.status {
                let updated = ctx.reservations.update_status(existing.id, mapped_status).await?;
                if !updated.holds_calendar() {
                    ctx.calendar.release_booking(updated.id).await?;
                }
                updated
            } else {
                existing
            };
            (Some(updated), false)
        }
        None => {
            let guest = ctx
                .guests
                .find_or_create(CreateGuest {
                    tenant_id: connection.property_id,
                    email: platform_booking.guest_email.clone(),
                    full_name: platform_booking.guest_name.clone(),
                    phone: platform_booking.guest_phone.clone(),
                })
                .await?;

            let claimed = ctx
                .reservations
                .create_holding_calendar(CreateCanonicalBooking {
                    property_id: connection.property_id,
                    guest_id: guest.id,
                    source: platform_booking.channel_kind.clone(),
                    channel_booking_id: Some(platform_booking.channel_booking_id.clone()),
                    booking_reference: None,
                    check_in_date: platform_booking.check_in_date,
                    check_out_date: platform_booking.check_out_date,
                    adults: platform_booking.adults,
                    children: platform_booking.children,
                    infants: platform_booking.infants,
                    nightly_rate: platform_booking.nightly_rate,
                    subtotal: platform_booking.subtotal,
                    fees: platform_booking.fees,
                    taxes: platform_booking.taxes,
                    total: platform_booking.total,
                    currency: platform_booking.currency.clone(),
                    status: map_status(&platform_booking.status).to_string(),
                    payment_status: payment_status::UNPAID.to_string(),
                    payment_intent_id: None,
                    expires_at: None,
                    channel_payload: Some(platform_booking.raw_payload.clone()),
                })
                .await?;

            (claimed, true)
        }
    };

    let Some(booking) = booking else {
        draft.skipped = 1;
        draft.error_message = Some("calendar_contended".to_string());
        ctx.connections.record_attempt(connection_id, Utc::now()).await?;
        ctx.sync_logs.finish(draft).await?;
        return Ok(());
    };

    if created {
        draft.created = 1;
    } else {
        draft.updated = 1;
    }
    ctx.connections.record_attempt(connection_id, Utc::now()).await?;
    ctx.connections.record_success(connection_id, Utc::now()).await?;
    ctx.sync_logs.finish(draft).await?;

    let event = BookingLifecycleEvent {
        property_id: connection.property_id,
        source: platform_booking.channel_kind.clone(),
        check_in: booking.check_in_date,
        check_out: booking.check_out_date,
    };
    if booking.holds_calendar() {
        crate::outbound::on_booking_confirmed(ctx.clone(), event).await?;
    } else if !created {
        crate::outbound::on_booking_cancelled(ctx.clone(), event).await?;
    }

    Ok(())
}

/// Maps a vendor-neutral status string (already normalized by the adapter)
/// onto the canonical booking status vocabulary.
fn map_status(adapter_status: &str) -> &'static str {
    match adapter_status {
        booking_status::CONFIRMED => booking_status::CONFIRMED,
        booking_status::CANCELLED => booking_status::CANCELLED,
        booking_status::DECLINED => booking_status::DECLINED,
        booking_status::CHECKED_IN => booking_status::CHECKED_IN,
        booking_status::CHECKED_OUT => booking_status::CHECKED_OUT,
        booking_status::NO_SHOW => booking_status::NO_SHOW,
        _ => booking_status::RESERVED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_status_falls_back_to_reserved() {
        assert_eq!(map_status("pending_review"), booking_status::RESERVED);
    }

    #[test]
    fn known_statuses_pass_through() {
        assert_eq!(map_status(booking_status::CONFIRMED), booking_status::CONFIRMED);
        assert_eq!(map_status(booking_status::CANCELLED), booking_status::CANCELLED);
    }
}
