//! Shared handles every sync-engine task needs: repositories, the two
//! cross-cutting safety components, the idempotency store, and the task
//! dispatcher tasks enqueue follow-up work onto.

use std::sync::Arc;

use channels::IntegrationCrypto;
use circuit::CircuitBreaker;
use db::repositories::{
    CalendarCellRepository, ChannelConnectionRepository, GuestRepository, ReservationRepository,
    SyncLogRepository,
};
use db::DbPool;
use ratelimit::RateLimiter;

use crate::idempotency::SeenStore;
use crate::tasks::TaskQueue;

#[derive(Clone)]
pub struct SyncContext {
    pub pool: DbPool,
    pub connections: Arc<ChannelConnectionRepository>,
    pub reservations: Arc<ReservationRepository>,
    pub calendar: Arc<CalendarCellRepository>,
    pub guests: Arc<GuestRepository>,
    pub sync_logs: Arc<SyncLogRepository>,
    pub rate_limiter: RateLimiter,
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub crypto: Arc<IntegrationCrypto>,
    pub seen: SeenStore,
    pub tasks: Arc<dyn TaskQueue>,
}

impl SyncContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        rate_limiter: RateLimiter,
        circuit_breaker: CircuitBreaker,
        crypto: IntegrationCrypto,
        seen: SeenStore,
        tasks: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            connections: Arc::new(ChannelConnectionRepository::new(pool.clone())),
            reservations: Arc::new(ReservationRepository::new(pool.clone())),
            calendar: Arc::new(CalendarCellRepository::new(pool.clone())),
            guests: Arc::new(GuestRepository::new(pool.clone())),
            sync_logs: Arc::new(SyncLogRepository::new(pool.clone())),
            pool,
            rate_limiter,
            circuit_breaker: Arc::new(circuit_breaker),
            crypto: Arc::new(crypto),
            seen,
            tasks,
        }
    }
}
