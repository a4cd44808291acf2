//! Five-minute poll of every active connection's bookings, for channels
//! whose webhook coverage is incomplete or whose connection predates it.

use chrono::{Duration as ChronoDuration, Utc};

use db::models::channel_kind;

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::inbound::import_channel_booking;
use crate::registry::adapter_for;

pub async fn poll_all_channels(ctx: &SyncContext) {
    for kind in channel_kind::ALL {
        if let Err(e) = poll_channel(ctx, kind).await {
            tracing::error!(channel = kind, error = %e, "channel poll failed");
        }
    }
}

async fn poll_channel(ctx: &SyncContext, channel_kind: &str) -> Result<(), SyncError> {
    let connections = ctx.connections.list_active_by_channel(channel_kind).await?;
    for connection in connections {
        if !connection.sync_bookings {
            continue;
        }
        if let Err(e) = poll_single_channel(ctx, connection.id).await {
            tracing::warn!(connection_id = %connection.id, channel = channel_kind, error = %e, "connection poll failed");
        }
    }
    Ok(())
}

/// Pulls bookings created or updated since the connection's last successful
/// sync (falling back to a 30-day lookback for a never-synced connection)
/// and imports each one. Deliberately not `last_attempt_at`: an attempt
/// timestamp advances on every tick including failed ones, so a connection
/// stuck failing would otherwise see its cursor creep toward "now" and
/// silently skip bookings created between two failed attempts.
pub async fn poll_single_channel(ctx: &SyncContext, connection_id: uuid::Uuid) -> Result<(), SyncError> {
    let Some(connection) = ctx.connections.find_by_id(connection_id).await? else {
        return Err(SyncError::ConnectionNotFound(connection_id));
    };

    ctx.rate_limiter
        .acquire(&connection.channel_kind, &connection.id.to_string(), 1)
        .await?;
    ctx.circuit_breaker.admit(&connection.channel_kind).await?;

    let token = channels::decrypt_if_available(Some(&ctx.crypto), &connection.access_token_encrypted);
    let Some(adapter) = adapter_for(&connection.channel_kind, &token, Some(&connection.remote_property_id)) else {
        return Err(SyncError::ConnectionNotFound(connection_id));
    };

    let since = connection.last_success_at.unwrap_or_else(|| Utc::now() - ChronoDuration::days(30));

    ctx.connections.record_attempt(connection.id, Utc::now()).await?;

    let result = adapter.get_bookings(&connection.remote_property_id, Some(since)).await;

    match result {
        Ok(bookings) => {
            ctx.circuit_breaker.record_success(&connection.channel_kind).await?;
            ctx.connections.record_success(connection.id, Utc::now()).await?;
            for booking in bookings {
                if let Err(e) = import_channel_booking(ctx, connection.id, booking).await {
                    tracing::error!(connection_id = %connection.id, error = %e, "import from poll failed");
                }
            }
            Ok(())
        }
        Err(err) => {
            ctx.circuit_breaker.record_failure(&connection.channel_kind).await?;
            ctx.connections.record_sync_failure(connection.id).await?;
            Err(err.into())
        }
    }
}
