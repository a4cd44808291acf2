//! The channel manager's background engine: outbound fan-out, inbound
//! import, polling, nightly reconciliation, token refresh, and the
//! event-stream consumer that triggers fan-out from outside this process.

pub mod backoff;
pub mod context;
pub mod error;
pub mod event_stream;
pub mod idempotency;
pub mod inbound;
pub mod outbound;
pub mod polling;
pub mod reconciliation;
pub mod registry;
pub mod scheduler;
pub mod tasks;
pub mod token_refresh;

pub use context::SyncContext;
pub use error::SyncError;
pub use scheduler::{Scheduler, SchedulerMetrics};
pub use tasks::{InProcessTaskQueue, TaskQueue};

pub use inbound::import_channel_booking;
pub use outbound::{
    on_availability_updated, on_booking_cancelled, on_booking_confirmed, on_pricing_updated,
    AvailabilityUpdatedEvent, BookingLifecycleEvent, PricingUpdatedEvent,
};
pub use event_stream::{publish_booking_cancelled, publish_booking_confirmed};
pub use polling::{poll_all_channels, poll_single_channel};
pub use reconciliation::reconcile_all;
pub use token_refresh::refresh_expiring_tokens;
