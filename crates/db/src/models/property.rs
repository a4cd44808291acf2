//! The local property: the pricing configuration and active flag the
//! reservation flow needs. Everything else about a property (address,
//! amenities, ownership) belongs to the property-management system this
//! crate mediates for, not to the channel manager.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod property_status {
    pub const ACTIVE: &str = "active";
    pub const INACTIVE: &str = "inactive";
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Property {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,

    pub base_price: Decimal,
    pub cleaning_fee: Decimal,
    pub tax_rate: Decimal,
    pub tax_included: bool,
    pub currency: String,

    pub status: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn is_active(&self) -> bool {
        self.status == property_status::ACTIVE
    }
}
