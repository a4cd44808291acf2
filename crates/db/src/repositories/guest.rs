use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::models::{CreateGuest, Guest};
use crate::DbPool;

pub struct GuestRepository {
    pool: DbPool,
}

impl GuestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Guest>, SqlxError> {
        sqlx::query_as::<_, Guest>(r#"SELECT * FROM guests WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Guest>, SqlxError> {
        sqlx::query_as::<_, Guest>(
            r#"SELECT * FROM guests WHERE tenant_id = $1 AND email = $2"#,
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// Finds the existing guest by email within the tenant, or creates one.
    /// Email is the sole dedup key; guests without an email (rare, some
    /// channel payloads omit it) are always created fresh.
    pub async fn find_or_create(&self, input: CreateGuest) -> Result<Guest, SqlxError> {
        if let Some(email) = input.email.as_deref() {
            if let Some(existing) = self.find_by_email(input.tenant_id, email).await? {
                return Ok(existing);
            }
        }

        sqlx::query_as::<_, Guest>(
            r#"
            INSERT INTO guests (tenant_id, email, full_name, phone)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, email) WHERE email IS NOT NULL
            DO UPDATE SET full_name = EXCLUDED.full_name, updated_at = now()
            RETURNING *
            "#,
        )
        .bind(input.tenant_id)
        .bind(&input.email)
        .bind(&input.full_name)
        .bind(&input.phone)
        .fetch_one(&self.pool)
        .await
    }
}
