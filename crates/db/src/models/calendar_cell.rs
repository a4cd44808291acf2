//! Per-`(property, date)` availability cell.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod cell_status {
    pub const AVAILABLE: &str = "available";
    pub const TENTATIVE: &str = "tentative";
    pub const BOOKED: &str = "booked";
    pub const BLOCKED: &str = "blocked";
}

/// One calendar day for one property.
///
/// `UNIQUE(property_id, date)`; at most one active (reserved/confirmed)
/// booking references a given cell at a time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct CalendarCell {
    pub id: Uuid,
    pub property_id: Uuid,
    pub date: NaiveDate,

    pub available: bool,
    pub status: String,

    pub price_override: Option<Decimal>,
    pub min_stay: Option<i32>,

    pub booking_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarCell {
    pub fn is_free(&self) -> bool {
        self.available && self.status == cell_status::AVAILABLE && self.booking_id.is_none()
    }
}
