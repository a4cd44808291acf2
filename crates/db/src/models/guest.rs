//! Guest identity, deduplicated per-tenant by email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Guest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: Option<String>,
    pub full_name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateGuest {
    pub tenant_id: Uuid,
    pub email: Option<String>,
    pub full_name: String,
    pub phone: Option<String>,
}
