//! The canonical reservation and its transient, not-yet-persisted cousin
//! emitted by platform adapters.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod booking_status {
    pub const INQUIRY: &str = "inquiry";
    pub const RESERVED: &str = "reserved";
    pub const CONFIRMED: &str = "confirmed";
    pub const CHECKED_IN: &str = "checked_in";
    pub const CHECKED_OUT: &str = "checked_out";
    pub const CANCELLED: &str = "cancelled";
    pub const DECLINED: &str = "declined";
    pub const NO_SHOW: &str = "no_show";

    /// Statuses that hold an exclusive claim on their calendar cells.
    pub const ACTIVE: [&str; 2] = [RESERVED, CONFIRMED];
}

pub mod payment_status {
    pub const UNPAID: &str = "unpaid";
    /// A payment intent exists and is awaiting capture — the state a fresh
    /// reservation holds between `create_booking` and `confirm_booking`.
    pub const PENDING: &str = "pending";
    pub const AUTHORIZED: &str = "authorized";
    pub const PAID: &str = "paid";
    pub const PARTIALLY_REFUNDED: &str = "partially_refunded";
    pub const REFUNDED: &str = "refunded";
    pub const EXPIRED: &str = "expired";
    pub const FAILED: &str = "failed";
}

/// Canonical event types every adapter maps its vendor strings onto.
pub mod event_type {
    pub const BOOKING_CREATED: &str = "booking.created";
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    pub const BOOKING_UPDATED: &str = "booking.updated";
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
    pub const BOOKING_DECLINED: &str = "booking.declined";
    pub const BOOKING_NO_SHOW: &str = "booking.no_show";
    pub const BOOKING_CHECKED_OUT: &str = "booking.checked_out";
    pub const AVAILABILITY_UPDATED: &str = "availability.updated";
    pub const PRICING_UPDATED: &str = "pricing.updated";
}

/// Source of a booking: one of the five channel kinds, or "direct".
pub const SOURCE_DIRECT: &str = "direct";

/// The normalized, persisted reservation.
///
/// `UNIQUE(source, channel_booking_id)` prevents duplicate imports;
/// `check_out_date > check_in_date` always holds.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct CanonicalBooking {
    pub id: Uuid,
    pub property_id: Uuid,
    pub guest_id: Uuid,

    /// Channel kind or `"direct"`.
    pub source: String,
    /// Nullable for direct bookings.
    pub channel_booking_id: Option<String>,
    /// `PMS-<year>-<000000>`; set only for direct bookings created through
    /// the reservation flow, `UNIQUE` where present.
    pub booking_reference: Option<String>,

    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,

    pub adults: i32,
    pub children: i32,
    pub infants: i32,

    pub nightly_rate: Decimal,
    pub subtotal: Decimal,
    pub fees: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
    pub currency: String,

    pub status: String,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub paid_amount: Option<Decimal>,

    /// Set when the reservation's 30-minute hold lapses without payment.
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,

    /// Opaque, adapter-specific payload kept for audit/debugging.
    pub channel_payload: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalBooking {
    pub fn nights(&self) -> i64 {
        (self.check_out_date - self.check_in_date).num_days()
    }

    pub fn holds_calendar(&self) -> bool {
        booking_status::ACTIVE.contains(&self.status.as_str())
    }
}

/// Input to persist a newly parsed or newly created booking.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCanonicalBooking {
    pub property_id: Uuid,
    pub guest_id: Uuid,
    pub source: String,
    pub channel_booking_id: Option<String>,
    pub booking_reference: Option<String>,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub infants: i32,
    pub nightly_rate: Decimal,
    pub subtotal: Decimal,
    pub fees: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub channel_payload: Option<serde_json::Value>,
}

/// The parsed, not-yet-persisted form an adapter emits when importing a
/// remote reservation. Same shape as `CanonicalBooking` minus internal
/// identifiers, plus the guest's contact details so the sync engine can
/// resolve or create the local `Guest` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformBooking {
    pub channel_kind: String,
    pub channel_booking_id: String,
    pub remote_property_id: String,

    pub guest_name: String,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,

    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub adults: i32,
    pub children: i32,
    pub infants: i32,

    pub nightly_rate: Decimal,
    pub subtotal: Decimal,
    pub fees: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
    pub currency: String,

    /// Vendor's own status string, already mapped by the adapter to one of
    /// `booking_status`'s constants.
    pub status: String,

    /// The vendor's last-modified timestamp, or the import time when the
    /// vendor doesn't supply one. Part of the inbound idempotency key so
    /// two distinct edits that happen to leave `status` unchanged don't
    /// collide.
    pub updated_at: DateTime<Utc>,

    pub raw_payload: serde_json::Value,
}

/// Normalized webhook event, transient — never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub channel_kind: String,
    pub event_type: String,
    pub event_id: String,
    /// The vendor's own listing/property identifier, carried in the webhook
    /// body itself so the connection can be resolved without baking a
    /// connection id into the callback URL.
    pub remote_property_id: String,
    pub occurred_at: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(status: &str) -> CanonicalBooking {
        CanonicalBooking {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            guest_id: Uuid::new_v4(),
            source: SOURCE_DIRECT.to_string(),
            channel_booking_id: None,
            booking_reference: Some("PMS-2026-000001".to_string()),
            check_in_date: NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            check_out_date: NaiveDate::from_ymd_opt(2026, 8, 13).unwrap(),
            adults: 2,
            children: 0,
            infants: 0,
            nightly_rate: dec!(100),
            subtotal: dec!(300),
            fees: dec!(20),
            taxes: dec!(15),
            total: dec!(335),
            currency: "EUR".to_string(),
            status: status.to_string(),
            payment_status: payment_status::UNPAID.to_string(),
            payment_intent_id: None,
            paid_amount: None,
            expires_at: None,
            confirmed_at: None,
            paid_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            channel_payload: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn nights_counts_exclusive_checkout() {
        assert_eq!(sample(booking_status::RESERVED).nights(), 3);
    }

    #[test]
    fn only_reserved_and_confirmed_hold_the_calendar() {
        assert!(sample(booking_status::RESERVED).holds_calendar());
        assert!(sample(booking_status::CONFIRMED).holds_calendar());
        assert!(!sample(booking_status::CANCELLED).holds_calendar());
        assert!(!sample(booking_status::INQUIRY).holds_calendar());
    }
}
