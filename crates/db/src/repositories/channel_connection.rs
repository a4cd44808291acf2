use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::models::{ChannelConnection, CreateChannelConnection};
use crate::DbPool;

pub struct ChannelConnectionRepository {
    pool: DbPool,
}

impl ChannelConnectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// All active connections, for the nightly reconciliation sweep.
    pub async fn list_all_active(&self) -> Result<Vec<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections WHERE status = 'active'"#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create(
        &self,
        input: CreateChannelConnection,
    ) -> Result<ChannelConnection, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"
            INSERT INTO channel_connections (
                property_id, channel_kind, remote_property_id,
                access_token_encrypted, refresh_token_encrypted, token_expires_at,
                sync_direction, sync_availability, sync_pricing, sync_bookings,
                price_adjustment, status, error_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'active', 0)
            RETURNING *
            "#,
        )
        .bind(input.property_id)
        .bind(&input.channel_kind)
        .bind(&input.remote_property_id)
        .bind(&input.access_token_encrypted)
        .bind(&input.refresh_token_encrypted)
        .bind(input.token_expires_at)
        .bind(&input.sync_direction)
        .bind(input.sync_availability)
        .bind(input.sync_pricing)
        .bind(input.sync_bookings)
        .bind(&input.price_adjustment)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_property_and_channel(
        &self,
        property_id: Uuid,
        channel_kind: &str,
    ) -> Result<Option<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections WHERE property_id = $1 AND channel_kind = $2"#,
        )
        .bind(property_id)
        .bind(channel_kind)
        .fetch_optional(&self.pool)
        .await
    }

    /// Resolves the connection a webhook payload belongs to. Only an
    /// `active` connection is eligible — a webhook for a disconnected or
    /// expired integration is skipped, not acted on.
    pub async fn find_by_remote_property(
        &self,
        channel_kind: &str,
        remote_property_id: &str,
    ) -> Result<Option<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections
               WHERE channel_kind = $1 AND remote_property_id = $2 AND status = 'active'"#,
        )
        .bind(channel_kind)
        .bind(remote_property_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Active connections for a property with availability sync enabled, in
    /// direction `bidirectional` or `outbound_only` — the outbound fan-out
    /// set an event handler enqueues writes against. The caller filters out
    /// the event's own source channel.
    pub async fn list_outbound_for_property(
        &self,
        property_id: Uuid,
    ) -> Result<Vec<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections
               WHERE property_id = $1 AND status = 'active' AND sync_availability = true
                 AND sync_direction IN ('bidirectional', 'outbound_only')"#,
        )
        .bind(property_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Active connections due for a poll tick, for any channel kind that
    /// lacks webhook push support. Skips a connection whose last attempt is
    /// still within the 5-minute poll interval so a scheduler tick running
    /// slightly ahead of schedule (or a webhook-triggered re-poll just
    /// before it) doesn't double up on the same connection.
    pub async fn list_active_by_channel(
        &self,
        channel_kind: &str,
    ) -> Result<Vec<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections
               WHERE channel_kind = $1 AND status = 'active'
                 AND (last_attempt_at IS NULL OR last_attempt_at < now() - interval '5 minutes')
               ORDER BY last_attempt_at ASC NULLS FIRST"#,
        )
        .bind(channel_kind)
        .fetch_all(&self.pool)
        .await
    }

    /// Connections whose OAuth token expires within `within_secs`, for the
    /// hourly token-refresh beat.
    pub async fn list_expiring_within(
        &self,
        within_secs: i64,
    ) -> Result<Vec<ChannelConnection>, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"SELECT * FROM channel_connections
               WHERE status = 'active'
                 AND token_expires_at IS NOT NULL
                 AND token_expires_at <= now() + make_interval(secs => $1)"#,
        )
        .bind(within_secs as f64)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn record_attempt(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), SqlxError> {
        sqlx::query(
            r#"UPDATE channel_connections SET last_attempt_at = $2, updated_at = now() WHERE id = $1"#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_success(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), SqlxError> {
        sqlx::query(
            r#"UPDATE channel_connections
               SET last_success_at = $2, error_count = 0, updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Increments the error counter; marks the connection `error` after the
    /// third consecutive authentication failure, as the token refresher's
    /// contract requires.
    pub async fn record_auth_failure(&self, id: Uuid) -> Result<ChannelConnection, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"
            UPDATE channel_connections
            SET error_count = error_count + 1,
                status = CASE WHEN error_count + 1 >= 3 THEN 'expired' ELSE status END,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    /// Increments the error counter after a non-auth sync failure (network,
    /// validation, remote 5xx). Unlike [`Self::record_auth_failure`] this
    /// never moves the connection to `expired` — only the token refresher's
    /// three-strikes rule does that.
    pub async fn record_sync_failure(&self, id: Uuid) -> Result<ChannelConnection, SqlxError> {
        sqlx::query_as::<_, ChannelConnection>(
            r#"
            UPDATE channel_connections
            SET error_count = error_count + 1,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_tokens(
        &self,
        id: Uuid,
        access_token_encrypted: &str,
        refresh_token_encrypted: Option<&str>,
        token_expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            UPDATE channel_connections
            SET access_token_encrypted = $2,
                refresh_token_encrypted = COALESCE($3, refresh_token_encrypted),
                token_expires_at = $4,
                status = 'active',
                error_count = 0,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(access_token_encrypted)
        .bind(refresh_token_encrypted)
        .bind(token_expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, id: Uuid, status: &str) -> Result<(), SqlxError> {
        sqlx::query(r#"UPDATE channel_connections SET status = $2, updated_at = now() WHERE id = $1"#)
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
