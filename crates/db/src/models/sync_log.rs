//! One row per sync attempt, written exclusively by the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod sync_task_type {
    pub const AVAILABILITY_PUSH: &str = "availability_push";
    pub const PRICING_PUSH: &str = "pricing_push";
    pub const BOOKING_EXPORT: &str = "booking_export";
    pub const BOOKING_IMPORT: &str = "booking_import";
    pub const WEBHOOK: &str = "webhook";
    pub const RECONCILIATION: &str = "reconciliation";
    pub const FULL: &str = "full";
}

pub mod sync_direction {
    pub const INBOUND: &str = "inbound";
    pub const OUTBOUND: &str = "outbound";
}

pub mod sync_status {
    pub const STARTED: &str = "started";
    pub const SUCCESS: &str = "success";
    pub const PARTIAL: &str = "partial";
    pub const FAILURE: &str = "failure";
    pub const SKIPPED: &str = "skipped";
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct SyncLog {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub task_type: String,
    pub direction: String,
    pub status: String,

    pub processed_count: i32,
    pub created_count: i32,
    pub updated_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,

    pub error_message: Option<String>,
    pub request_payload: Option<serde_json::Value>,
    pub response_payload: Option<serde_json::Value>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Builder accumulated by a sync task as it runs, written once on completion.
#[derive(Debug, Clone)]
pub struct SyncLogDraft {
    pub connection_id: Uuid,
    pub task_type: &'static str,
    pub direction: &'static str,
    pub started_at: DateTime<Utc>,
    pub processed: i32,
    pub created: i32,
    pub updated: i32,
    pub failed: i32,
    pub skipped: i32,
    pub error_message: Option<String>,
    pub request_payload: Option<serde_json::Value>,
    pub response_payload: Option<serde_json::Value>,
}

impl SyncLogDraft {
    pub fn new(connection_id: Uuid, task_type: &'static str, direction: &'static str) -> Self {
        Self {
            connection_id,
            task_type,
            direction,
            started_at: Utc::now(),
            processed: 0,
            created: 0,
            updated: 0,
            failed: 0,
            skipped: 0,
            error_message: None,
            request_payload: None,
            response_payload: None,
        }
    }

    pub fn status(&self) -> &'static str {
        if self.error_message.is_some() && self.processed == self.failed {
            sync_status::FAILURE
        } else if self.failed > 0 {
            sync_status::PARTIAL
        } else if self.processed == 0 && self.skipped > 0 {
            sync_status::SKIPPED
        } else {
            sync_status::SUCCESS
        }
    }
}
