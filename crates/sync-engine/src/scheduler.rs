//! The sync engine's four recurring beats: hourly token refresh, five-minute
//! polling, nightly reconciliation, and the ten-second event-stream tick.
//! One `tokio::spawn`ed loop per beat, each wrapped so a single bad tick
//! logs and continues rather than taking the others down with it.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{Timelike, Utc};
use redis::aio::ConnectionManager;
use tokio::time::interval;

use crate::context::SyncContext;
use crate::event_stream;
use crate::polling;
use crate::reconciliation;
use crate::token_refresh;

const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
const POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);
const EVENT_STREAM_INTERVAL: Duration = Duration::from_secs(10);
/// The reconciliation beat itself ticks hourly; `should_run_reconciliation`
/// narrows that down to the 02:00 hour so it only actually runs once a day.
const RECONCILIATION_TICK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const RECONCILIATION_HOUR_UTC: u32 = 2;

#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub token_refresh_ticks: u64,
    pub polling_ticks: u64,
    pub reconciliation_runs: u64,
    pub event_stream_ticks: u64,
    pub errors: u64,
}

pub struct Scheduler {
    ctx: SyncContext,
    stream_conn: ConnectionManager,
    consumer_name: String,
    metrics: Mutex<SchedulerMetrics>,
}

impl Scheduler {
    pub fn new(ctx: SyncContext, stream_conn: ConnectionManager, worker_id: &str) -> Self {
        Self {
            ctx,
            stream_conn,
            consumer_name: format!("worker-{worker_id}"),
            metrics: Mutex::new(SchedulerMetrics::default()),
        }
    }

    pub fn snapshot_metrics(&self) -> SchedulerMetrics {
        let guard = self.metrics.lock().unwrap();
        SchedulerMetrics {
            token_refresh_ticks: guard.token_refresh_ticks,
            polling_ticks: guard.polling_ticks,
            reconciliation_runs: guard.reconciliation_runs,
            event_stream_ticks: guard.event_stream_ticks,
            errors: guard.errors,
        }
    }

    fn increment_errors(&self) {
        self.metrics.lock().unwrap().errors += 1;
    }

    /// Spawns all four beats and ensures the event stream's consumer group
    /// exists before the tick loop starts reading from it.
    pub async fn start(mut self) -> tokio::task::JoinHandle<()> {
        if let Err(e) = event_stream::ensure_consumer_group(&mut self.stream_conn).await {
            tracing::warn!(error = %e, "could not ensure pms:events consumer group");
        }

        let scheduler = std::sync::Arc::new(self);

        let token_refresh_handle = scheduler.clone();
        tokio::spawn(async move { token_refresh_handle.run_token_refresh_loop().await });

        let polling_handle = scheduler.clone();
        tokio::spawn(async move { polling_handle.run_polling_loop().await });

        let reconciliation_handle = scheduler.clone();
        tokio::spawn(async move { reconciliation_handle.run_reconciliation_loop().await });

        let event_stream_handle = scheduler.clone();
        tokio::spawn(async move { event_stream_handle.run_event_stream_loop().await })
    }

    async fn run_token_refresh_loop(self: std::sync::Arc<Self>) {
        let mut ticker = interval(TOKEN_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            token_refresh::refresh_expiring_tokens(&self.ctx).await;
            self.metrics.lock().unwrap().token_refresh_ticks += 1;
        }
    }

    async fn run_polling_loop(self: std::sync::Arc<Self>) {
        let mut ticker = interval(POLLING_INTERVAL);
        loop {
            ticker.tick().await;
            polling::poll_all_channels(&self.ctx).await;
            self.metrics.lock().unwrap().polling_ticks += 1;
        }
    }

    async fn run_reconciliation_loop(self: std::sync::Arc<Self>) {
        let mut ticker = interval(RECONCILIATION_TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if Utc::now().hour() != RECONCILIATION_HOUR_UTC {
                continue;
            }
            reconciliation::reconcile_all(&self.ctx).await;
            self.metrics.lock().unwrap().reconciliation_runs += 1;
        }
    }

    async fn run_event_stream_loop(self: std::sync::Arc<Self>) {
        let mut ticker = interval(EVENT_STREAM_INTERVAL);
        let mut conn = self.stream_conn.clone();
        loop {
            ticker.tick().await;
            if let Err(e) = event_stream::poll_once(&self.ctx, &mut conn, &self.consumer_name).await {
                tracing::error!(error = %e, "event stream poll failed");
                self.increment_errors();
            }
            self.metrics.lock().unwrap().event_stream_ticks += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_metrics_default_to_zero() {
        let metrics = SchedulerMetrics::default();
        assert_eq!(metrics.token_refresh_ticks, 0);
        assert_eq!(metrics.errors, 0);
    }

    #[test]
    fn reconciliation_hour_is_the_quiet_overnight_slot() {
        assert_eq!(RECONCILIATION_HOUR_UTC, 2);
    }
}
