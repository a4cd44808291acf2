//! Shared handles the direct-booking flow needs: repositories, the
//! calendar-hold lock, the configured payment processor, and the
//! coordination-store handles for webhook idempotency and cross-process
//! fan-out.

use std::sync::Arc;

use channels::DistributedLock;
use db::repositories::{CalendarCellRepository, GuestRepository, PropertyRepository, ReservationRepository};
use db::DbPool;
use redis::aio::ConnectionManager;
use sync_engine::idempotency::SeenStore;

use crate::payment::PaymentProcessor;

#[derive(Clone)]
pub struct ReservationContext {
    pub pool: DbPool,
    pub properties: Arc<PropertyRepository>,
    pub reservations: Arc<ReservationRepository>,
    pub calendar: Arc<CalendarCellRepository>,
    pub guests: Arc<GuestRepository>,
    pub lock: Arc<DistributedLock>,
    pub payments: Arc<dyn PaymentProcessor>,
    /// Dedup store for payment-processor webhook event ids, shared with the
    /// sync engine's 24h "seen" TTL semantics.
    pub seen: SeenStore,
    /// Connection used to publish `booking_confirmed`/`booking_cancelled`
    /// onto `pms:events` for the sync engine's event-stream consumer to pick
    /// up; this crate never links the sync engine directly to trigger a
    /// fan-out.
    pub events: ConnectionManager,
}

impl ReservationContext {
    pub fn new(
        pool: DbPool,
        lock: Arc<DistributedLock>,
        payments: Arc<dyn PaymentProcessor>,
        seen: SeenStore,
        events: ConnectionManager,
    ) -> Self {
        Self {
            properties: Arc::new(PropertyRepository::new(pool.clone())),
            reservations: Arc::new(ReservationRepository::new(pool.clone())),
            calendar: Arc::new(CalendarCellRepository::new(pool.clone())),
            guests: Arc::new(GuestRepository::new(pool.clone())),
            pool,
            lock,
            payments,
            seen,
            events,
        }
    }
}
