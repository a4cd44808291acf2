//! Outbound event handlers and the per-channel write tasks they enqueue.
//!
//! A local change (booking confirmed/cancelled, availability or pricing
//! edited directly) fans out to every other active connection on the same
//! property. The channel the change originated from is excluded so a write
//! a sync task itself produced never bounces back as a new event.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use channels::decrypt_if_available;
use db::models::sync_log::{sync_direction, sync_task_type};
use db::models::{ChannelConnection, SyncLogDraft};

use crate::backoff::{self, MAX_RETRIES_WRITE};
use crate::context::SyncContext;
use crate::error::SyncError;
use crate::registry::adapter_for;

/// A locally confirmed or cancelled booking, the trigger for an
/// availability push to every other channel on the property. Also the wire
/// shape published on the `pms:events` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLifecycleEvent {
    pub property_id: Uuid,
    pub source: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityUpdatedEvent {
    pub property_id: Uuid,
    pub source: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub available: bool,
    pub min_stay: Option<i32>,
    pub max_stay: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingUpdatedEvent {
    pub property_id: Uuid,
    pub source: String,
    pub prices: HashMap<NaiveDate, Decimal>,
    pub currency: String,
}

async fn fan_out_targets(
    ctx: &SyncContext,
    property_id: Uuid,
    source: &str,
) -> Result<Vec<ChannelConnection>, SyncError> {
    let connections = ctx.connections.list_outbound_for_property(property_id).await?;
    Ok(connections.into_iter().filter(|c| c.channel_kind != source).collect())
}

pub async fn on_booking_confirmed(ctx: SyncContext, event: BookingLifecycleEvent) -> Result<(), SyncError> {
    dispatch_availability(ctx, event, false).await
}

pub async fn on_booking_cancelled(ctx: SyncContext, event: BookingLifecycleEvent) -> Result<(), SyncError> {
    dispatch_availability(ctx, event, true).await
}

async fn dispatch_availability(
    ctx: SyncContext,
    event: BookingLifecycleEvent,
    available: bool,
) -> Result<(), SyncError> {
    let targets = fan_out_targets(&ctx, event.property_id, &event.source).await?;
    for connection in targets {
        let ctx = ctx.clone();
        let tasks = ctx.tasks.clone();
        let (start, end) = (event.check_in, event.check_out);
        tasks
            .enqueue(Box::pin(async move {
                run_availability_write(ctx, connection, start, end, available, None, None, 0).await
            }))
            .await;
    }
    Ok(())
}

pub async fn on_availability_updated(ctx: SyncContext, event: AvailabilityUpdatedEvent) -> Result<(), SyncError> {
    let targets = fan_out_targets(&ctx, event.property_id, &event.source).await?;
    for connection in targets {
        let ctx = ctx.clone();
        let tasks = ctx.tasks.clone();
        let (start, end, available, min_stay, max_stay) =
            (event.start, event.end, event.available, event.min_stay, event.max_stay);
        tasks
            .enqueue(Box::pin(async move {
                run_availability_write(ctx, connection, start, end, available, min_stay, max_stay, 0).await
            }))
            .await;
    }
    Ok(())
}

pub async fn on_pricing_updated(ctx: SyncContext, event: PricingUpdatedEvent) -> Result<(), SyncError> {
    let targets = fan_out_targets(&ctx, event.property_id, &event.source).await?;
    for connection in targets {
        let ctx = ctx.clone();
        let tasks = ctx.tasks.clone();
        let prices = event.prices.clone();
        let currency = event.currency.clone();
        tasks
            .enqueue(Box::pin(async move { run_pricing_write(ctx, connection, prices, currency, 0).await }))
            .await;
    }
    Ok(())
}

/// The task body `BoxedTask` futures run — swallows its own error after
/// logging, since nothing downstream awaits the enqueued future's result.
async fn run_availability_write(
    ctx: SyncContext,
    connection: ChannelConnection,
    start: NaiveDate,
    end: NaiveDate,
    available: bool,
    min_stay: Option<i32>,
    max_stay: Option<i32>,
    retry: u32,
) {
    let outcome = update_channel_availability(&ctx, &connection, start, end, available, min_stay, max_stay).await;
    handle_write_outcome(ctx, connection, outcome, retry, move |ctx, connection, retry| {
        Box::pin(run_availability_write(ctx, connection, start, end, available, min_stay, max_stay, retry))
    })
    .await;
}

async fn run_pricing_write(
    ctx: SyncContext,
    connection: ChannelConnection,
    prices: HashMap<NaiveDate, Decimal>,
    currency: String,
    retry: u32,
) {
    let outcome = update_channel_pricing(&ctx, &connection, &prices, &currency).await;
    let prices_for_retry = prices.clone();
    let currency_for_retry = currency.clone();
    handle_write_outcome(ctx, connection, outcome, retry, move |ctx, connection, retry| {
        Box::pin(run_pricing_write(ctx, connection, prices_for_retry, currency_for_retry, retry))
    })
    .await;
}

async fn handle_write_outcome<F>(
    ctx: SyncContext,
    connection: ChannelConnection,
    outcome: Result<(), SyncError>,
    retry: u32,
    retry_with: F,
) where
    F: FnOnce(SyncContext, ChannelConnection, u32) -> crate::tasks::BoxedTask + Send + 'static,
{
    let Err(err) = outcome else { return };

    if !err.is_retryable() || retry >= backoff::MAX_RETRIES_WRITE {
        tracing::error!(
            connection_id = %connection.id,
            channel = %connection.channel_kind,
            retry,
            error = %err,
            "outbound write gave up"
        );
        return;
    }

    let delay = backoff::delay_for(retry);
    tracing::warn!(
        connection_id = %connection.id,
        channel = %connection.channel_kind,
        retry,
        delay_secs = delay.as_secs_f64(),
        error = %err,
        "outbound write failed, scheduling retry"
    );
    tokio::time::sleep(delay).await;
    let tasks = ctx.tasks.clone();
    tasks.enqueue(retry_with(ctx, connection, retry + 1)).await;
}

pub async fn update_channel_availability(
    ctx: &SyncContext,
    connection: &ChannelConnection,
    start: NaiveDate,
    end: NaiveDate,
    available: bool,
    min_stay: Option<i32>,
    max_stay: Option<i32>,
) -> Result<(), SyncError> {
    let mut draft = SyncLogDraft::new(connection.id, sync_task_type::AVAILABILITY_PUSH, sync_direction::OUTBOUND);

    ctx.connections.record_attempt(connection.id, Utc::now()).await?;

    if let Err(err) = ctx
        .rate_limiter
        .acquire(&connection.channel_kind, &connection.id.to_string(), 1)
        .await
    {
        draft.skipped = 1;
        draft.error_message = Some(err.to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(err.into());
    }

    if let Err(err) = ctx.circuit_breaker.admit(&connection.channel_kind).await {
        draft.skipped = 1;
        draft.error_message = Some("circuit_breaker_open".to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(err.into());
    }

    let Some(adapter) = resolve_adapter(ctx, connection) else {
        draft.processed = 1;
        draft.failed = 1;
        draft.error_message = Some("no adapter for channel kind".to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(SyncError::ConnectionNotFound(connection.id));
    };

    draft.processed = 1;
    let result = adapter
        .update_availability(&connection.remote_property_id, start, end, available, min_stay, max_stay)
        .await;

    finish_write(ctx, connection, &mut draft, result.map_err(SyncError::from)).await
}

pub async fn update_channel_pricing(
    ctx: &SyncContext,
    connection: &ChannelConnection,
    prices: &HashMap<NaiveDate, Decimal>,
    currency: &str,
) -> Result<(), SyncError> {
    let mut draft = SyncLogDraft::new(connection.id, sync_task_type::PRICING_PUSH, sync_direction::OUTBOUND);
    let count = prices.len() as i32;

    ctx.connections.record_attempt(connection.id, Utc::now()).await?;

    if let Err(err) = ctx
        .rate_limiter
        .acquire(&connection.channel_kind, &connection.id.to_string(), 1)
        .await
    {
        draft.skipped = count;
        draft.error_message = Some(err.to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(err.into());
    }

    if let Err(err) = ctx.circuit_breaker.admit(&connection.channel_kind).await {
        draft.skipped = count;
        draft.error_message = Some("circuit_breaker_open".to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(err.into());
    }

    let Some(adapter) = resolve_adapter(ctx, connection) else {
        draft.processed = count;
        draft.failed = count;
        draft.error_message = Some("no adapter for channel kind".to_string());
        ctx.sync_logs.finish(draft).await?;
        return Err(SyncError::ConnectionNotFound(connection.id));
    };

    let adjusted: HashMap<NaiveDate, Decimal> = match connection.price_adjustment() {
        Some(adjustment) => prices.iter().map(|(date, price)| (*date, adjustment.apply(*price))).collect(),
        None => prices.clone(),
    };

    draft.processed = count;
    let result = adapter.update_pricing_bulk(&connection.remote_property_id, &adjusted, currency).await;

    finish_write(ctx, connection, &mut draft, result.map_err(SyncError::from)).await
}

fn resolve_adapter(
    ctx: &SyncContext,
    connection: &ChannelConnection,
) -> Option<std::sync::Arc<dyn channels::ChannelAdapter>> {
    let token = decrypt_if_available(Some(&ctx.crypto), &connection.access_token_encrypted);
    adapter_for(&connection.channel_kind, &token, Some(&connection.remote_property_id))
}

async fn finish_write(
    ctx: &SyncContext,
    connection: &ChannelConnection,
    draft: &mut SyncLogDraft,
    result: Result<(), SyncError>,
) -> Result<(), SyncError> {
    match result {
        Ok(()) => {
            ctx.circuit_breaker.record_success(&connection.channel_kind).await?;
            ctx.connections.record_success(connection.id, Utc::now()).await?;
            draft.created = draft.processed;
            ctx.sync_logs.finish(draft.clone()).await?;
            Ok(())
        }
        Err(err) => {
            if matches!(err, SyncError::Adapter(channels::ChannelAdapterError::Authentication { .. })) {
                // Authentication failures don't reflect the channel's health
                // the way a timeout or a 5xx does, so they don't count
                // toward tripping the circuit — they go straight to the
                // token refresher instead of waiting for the hourly sweep.
                crate::token_refresh::refresh_connection_now(ctx, connection).await;
            } else {
                ctx.circuit_breaker.record_failure(&connection.channel_kind).await?;
            }
            ctx.connections.record_sync_failure(connection.id).await?;
            draft.failed = draft.processed;
            draft.error_message = Some(err.to_string());
            ctx.sync_logs.finish(draft.clone()).await?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_matches_write_ceiling() {
        assert_eq!(MAX_RETRIES_WRITE, 5);
    }
}
