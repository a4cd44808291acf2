//! Nightly sweep comparing each connection's remote calendar against the
//! local one and re-pushing any date that has drifted.
//!
//! The local `calendar_cells` table is the source of truth: reconciliation
//! never rewrites it from what a channel reports. An empty remote
//! availability map (Google's read path returns one when it has nothing to
//! say) is treated as "no information", not "everything unavailable" — it
//! must never be read as a signal to block every date on the property.

use chrono::{Duration as ChronoDuration, Utc};

use db::models::channel_connection::ChannelConnection;
use db::models::sync_log::{sync_direction, sync_task_type};
use db::models::SyncLogDraft;

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::registry::adapter_for;

const RECONCILIATION_HORIZON_DAYS: i64 = 90;

pub async fn reconcile_all(ctx: &SyncContext) {
    let connections = match ctx.connections.list_all_active().await {
        Ok(connections) => connections,
        Err(e) => {
            tracing::error!(error = %e, "could not list connections for reconciliation");
            return;
        }
    };

    for connection in connections {
        if !connection.sync_availability {
            continue;
        }
        if let Err(e) = reconcile_connection(ctx, &connection).await {
            tracing::error!(connection_id = %connection.id, channel = %connection.channel_kind, error = %e, "reconciliation failed");
        }
    }
}

async fn reconcile_connection(ctx: &SyncContext, connection: &ChannelConnection) -> Result<(), SyncError> {
    let today = Utc::now().date_naive();
    let horizon = today + ChronoDuration::days(RECONCILIATION_HORIZON_DAYS);

    let mut draft = SyncLogDraft::new(connection.id, sync_task_type::RECONCILIATION, sync_direction::OUTBOUND);

    ctx.rate_limiter
        .acquire(&connection.channel_kind, &connection.id.to_string(), 1)
        .await?;
    ctx.circuit_breaker.admit(&connection.channel_kind).await?;

    let token = channels::decrypt_if_available(Some(&ctx.crypto), &connection.access_token_encrypted);
    let Some(adapter) = adapter_for(&connection.channel_kind, &token, Some(&connection.remote_property_id)) else {
        return Err(SyncError::ConnectionNotFound(connection.id));
    };

    let remote = adapter.get_availability(&connection.remote_property_id, today, horizon).await;

    let remote_map = match remote {
        Ok(map) => {
            ctx.circuit_breaker.record_success(&connection.channel_kind).await?;
            ctx.connections.record_success(connection.id, Utc::now()).await?;
            map
        }
        Err(err) => {
            ctx.circuit_breaker.record_failure(&connection.channel_kind).await?;
            ctx.connections.record_sync_failure(connection.id).await?;
            draft.failed = 1;
            draft.error_message = Some(err.to_string());
            ctx.sync_logs.finish(draft).await?;
            return Err(err.into());
        }
    };

    if remote_map.is_empty() {
        tracing::debug!(connection_id = %connection.id, "empty remote availability map, skipping correction pass");
        draft.skipped = 1;
        ctx.sync_logs.finish(draft).await?;
        return Ok(());
    }

    let local_cells = ctx.calendar.list_range(connection.property_id, today, horizon).await?;
    draft.processed = local_cells.len() as i32;

    let mut corrected = 0;
    for cell in &local_cells {
        let Some(&remote_available) = remote_map.get(&cell.date) else {
            continue;
        };
        let local_available = cell.is_free();
        if remote_available == local_available {
            continue;
        }

        let next_day = cell.date + ChronoDuration::days(1);
        let result = adapter
            .update_availability(&connection.remote_property_id, cell.date, next_day, local_available, None, None)
            .await;

        match result {
            Ok(()) => corrected += 1,
            Err(e) => {
                tracing::warn!(connection_id = %connection.id, date = %cell.date, error = %e, "reconciliation correction failed");
                draft.failed += 1;
            }
        }
    }

    draft.updated = corrected;
    ctx.sync_logs.finish(draft).await?;
    Ok(())
}
