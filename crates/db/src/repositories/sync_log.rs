use chrono::Utc;
use sqlx::Error as SqlxError;
use uuid::Uuid;

use crate::models::{SyncLog, SyncLogDraft};
use crate::DbPool;

pub struct SyncLogRepository {
    pool: DbPool,
}

impl SyncLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn finish(&self, draft: SyncLogDraft) -> Result<SyncLog, SqlxError> {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - draft.started_at).num_milliseconds();
        let status = draft.status();

        metrics::register_counter!(
            "sync_log_total",
            "task_type" => draft.task_type,
            "direction" => draft.direction,
            "status" => status,
        )
        .increment(1);

        sqlx::query_as::<_, SyncLog>(
            r#"
            INSERT INTO sync_logs (
                connection_id, task_type, direction, status,
                processed_count, created_count, updated_count, failed_count, skipped_count,
                error_message, request_payload, response_payload,
                started_at, finished_at, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(draft.connection_id)
        .bind(draft.task_type)
        .bind(draft.direction)
        .bind(status)
        .bind(draft.processed)
        .bind(draft.created)
        .bind(draft.updated)
        .bind(draft.failed)
        .bind(draft.skipped)
        .bind(&draft.error_message)
        .bind(&draft.request_payload)
        .bind(&draft.response_payload)
        .bind(draft.started_at)
        .bind(finished_at)
        .bind(duration_ms)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_for_connection(
        &self,
        connection_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncLog>, SqlxError> {
        sqlx::query_as::<_, SyncLog>(
            r#"SELECT * FROM sync_logs WHERE connection_id = $1
               ORDER BY started_at DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(connection_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_for_connection(&self, connection_id: Uuid) -> Result<i64, SqlxError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT count(*) FROM sync_logs WHERE connection_id = $1"#)
                .bind(connection_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
