//! Consumer-group reader for `pms:events`, the stream other services
//! publish local booking/availability/pricing changes onto. Decouples
//! callers that want to trigger a channel fan-out from linking this crate
//! directly — they only need a Redis client.

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::Deserialize;

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::outbound::{
    on_availability_updated, on_booking_cancelled, on_booking_confirmed, on_pricing_updated,
    AvailabilityUpdatedEvent, BookingLifecycleEvent, PricingUpdatedEvent,
};

pub const STREAM_KEY: &str = "pms:events";
pub const CONSUMER_GROUP: &str = "channel_manager";
const BLOCK_MS: usize = 1000;
const READ_COUNT: usize = 10;

/// Publishes one event onto `pms:events` in the internally-tagged shape
/// [`PmsEvent`] expects on read, for callers outside this crate (the
/// reservation flow) that trigger a fan-out without going through a task
/// handler directly. Returns the assigned entry id.
pub async fn publish_booking_confirmed(
    conn: &mut ConnectionManager,
    event: &BookingLifecycleEvent,
) -> redis::RedisResult<String> {
    publish(conn, "booking_confirmed", event).await
}

pub async fn publish_booking_cancelled(
    conn: &mut ConnectionManager,
    event: &BookingLifecycleEvent,
) -> redis::RedisResult<String> {
    publish(conn, "booking_cancelled", event).await
}

async fn publish<T: serde::Serialize>(
    conn: &mut ConnectionManager,
    event_type: &str,
    event: &T,
) -> redis::RedisResult<String> {
    let mut value = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("event_type".to_string(), serde_json::Value::String(event_type.to_string()));
    }
    conn.xadd(STREAM_KEY, "*", &[("payload", value.to_string())]).await
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
enum PmsEvent {
    BookingConfirmed(BookingLifecycleEvent),
    BookingCancelled(BookingLifecycleEvent),
    AvailabilityUpdated(AvailabilityUpdatedEvent),
    PricingUpdated(PricingUpdatedEvent),
}

/// Idempotent: `XGROUP CREATE ... MKSTREAM` fails with `BUSYGROUP` once the
/// group already exists, which this treats as success.
pub async fn ensure_consumer_group(conn: &mut ConnectionManager) -> redis::RedisResult<()> {
    let result: redis::RedisResult<()> = conn.xgroup_create_mkstream(STREAM_KEY, CONSUMER_GROUP, "$").await;
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
        Err(e) => Err(e),
    }
}

/// One `XREADGROUP` call: blocks up to one second for up to ten entries,
/// dispatches each, and acks only the ones that dispatched without error so
/// a crash mid-batch leaves the rest for redelivery.
pub async fn poll_once(ctx: &SyncContext, conn: &mut ConnectionManager, consumer_name: &str) -> redis::RedisResult<usize> {
    let opts = StreamReadOptions::default()
        .group(CONSUMER_GROUP, consumer_name)
        .block(BLOCK_MS)
        .count(READ_COUNT);

    let reply: StreamReadReply = conn.xread_options(&[STREAM_KEY], &[">"], &opts).await?;

    let mut dispatched = 0;
    for stream in reply.keys {
        for entry in stream.ids {
            let Some(value) = entry.map.get("payload") else {
                let _: redis::RedisResult<i64> = conn.xack(STREAM_KEY, CONSUMER_GROUP, &[&entry.id]).await;
                continue;
            };
            let payload: String = match redis::from_redis_value(value) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(entry_id = %entry.id, error = %e, "unreadable stream entry payload, acking to skip");
                    let _: redis::RedisResult<i64> = conn.xack(STREAM_KEY, CONSUMER_GROUP, &[&entry.id]).await;
                    continue;
                }
            };

            match dispatch(ctx, &payload).await {
                Ok(()) => {
                    dispatched += 1;
                    let _: i64 = conn.xack(STREAM_KEY, CONSUMER_GROUP, &[&entry.id]).await?;
                }
                Err(e) => {
                    tracing::error!(entry_id = %entry.id, error = %e, "event dispatch failed, leaving unacked for redelivery");
                }
            }
        }
    }
    Ok(dispatched)
}

async fn dispatch(ctx: &SyncContext, payload: &str) -> Result<(), SyncError> {
    let event: PmsEvent = serde_json::from_str(payload).map_err(|e| SyncError::MalformedEvent(e.to_string()))?;

    match event {
        PmsEvent::BookingConfirmed(event) => on_booking_confirmed(ctx.clone(), event).await,
        PmsEvent::BookingCancelled(event) => on_booking_cancelled(ctx.clone(), event).await,
        PmsEvent::AvailabilityUpdated(event) => on_availability_updated(ctx.clone(), event).await,
        PmsEvent::PricingUpdated(event) => on_pricing_updated(ctx.clone(), event).await,
    }
}
