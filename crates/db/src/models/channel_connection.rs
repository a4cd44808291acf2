//! Channel connection entity: the binding between a local property and one
//! remote channel account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Remote channel kind. Stored as the lowercase string in Postgres.
pub mod channel_kind {
    pub const AIRBNB: &str = "airbnb";
    pub const BOOKING_COM: &str = "booking_com";
    pub const EXPEDIA: &str = "expedia";
    pub const FEWO_DIREKT: &str = "fewo_direkt";
    pub const GOOGLE: &str = "google";

    pub const ALL: [&str; 5] = [AIRBNB, BOOKING_COM, EXPEDIA, FEWO_DIREKT, GOOGLE];
}

/// Direction of sync a connection participates in.
pub mod sync_direction {
    pub const INBOUND_ONLY: &str = "inbound_only";
    pub const OUTBOUND_ONLY: &str = "outbound_only";
    pub const BIDIRECTIONAL: &str = "bidirectional";
}

/// Operational status of a channel connection.
pub mod connection_status {
    pub const ACTIVE: &str = "active";
    pub const EXPIRED: &str = "expired";
    pub const ERROR: &str = "error";
}

/// Percentage or fixed-offset price adjustment applied on outbound pricing
/// pushes for a connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceAdjustment {
    Percentage { value: Decimal },
    FixedOffset { value: Decimal },
}

impl PriceAdjustment {
    pub fn apply(&self, base: Decimal) -> Decimal {
        match self {
            PriceAdjustment::Percentage { value } => {
                base + base * value / Decimal::ONE_HUNDRED
            }
            PriceAdjustment::FixedOffset { value } => base + value,
        }
    }
}

/// Binding between a local property and one remote channel account.
///
/// Created by an onboarding flow; mutated only by the sync engine and the
/// token refresher. Soft-deactivated (`status = "expired"`/`"error"`),
/// never hard-deleted while bookings still reference it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ChannelConnection {
    pub id: Uuid,
    pub property_id: Uuid,
    pub channel_kind: String,
    pub remote_property_id: String,

    /// AES-256-GCM ciphertext ("enc:" prefixed), see `channels::crypto`.
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,

    pub sync_direction: String,
    pub sync_availability: bool,
    pub sync_pricing: bool,
    pub sync_bookings: bool,

    /// Serialized `PriceAdjustment`, nullable.
    pub price_adjustment: Option<serde_json::Value>,

    pub status: String,
    pub error_count: i32,

    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelConnection {
    pub fn is_active(&self) -> bool {
        self.status == connection_status::ACTIVE
    }

    pub fn accepts_inbound(&self) -> bool {
        matches!(
            self.sync_direction.as_str(),
            sync_direction::INBOUND_ONLY | sync_direction::BIDIRECTIONAL
        )
    }

    pub fn accepts_outbound(&self) -> bool {
        matches!(
            self.sync_direction.as_str(),
            sync_direction::OUTBOUND_ONLY | sync_direction::BIDIRECTIONAL
        )
    }

    pub fn price_adjustment(&self) -> Option<PriceAdjustment> {
        self.price_adjustment
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// Input for creating a connection during onboarding.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateChannelConnection {
    pub property_id: Uuid,
    pub channel_kind: String,
    pub remote_property_id: String,
    pub access_token_encrypted: String,
    pub refresh_token_encrypted: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub sync_direction: String,
    #[serde(default = "crate::models::default_true")]
    pub sync_availability: bool,
    #[serde(default = "crate::models::default_true")]
    pub sync_pricing: bool,
    #[serde(default = "crate::models::default_true")]
    pub sync_bookings: bool,
    pub price_adjustment: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percentage_adjustment_increases_base() {
        let adj = PriceAdjustment::Percentage { value: dec!(10) };
        assert_eq!(adj.apply(dec!(100)), dec!(110.0));
    }

    #[test]
    fn fixed_offset_adjustment_can_be_negative() {
        let adj = PriceAdjustment::FixedOffset { value: dec!(-5) };
        assert_eq!(adj.apply(dec!(100)), dec!(95));
    }
}
