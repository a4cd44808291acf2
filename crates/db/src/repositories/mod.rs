//! Repositories: one struct per aggregate, each holding a `DbPool` and
//! exposing the queries the sync engine and reservation flow need.

pub mod calendar_cell;
pub mod channel_connection;
pub mod guest;
pub mod property;
pub mod reservation;
pub mod sync_log;

pub use calendar_cell::CalendarCellRepository;
pub use channel_connection::ChannelConnectionRepository;
pub use guest::GuestRepository;
pub use property::PropertyRepository;
pub use reservation::ReservationRepository;
pub use sync_log::SyncLogRepository;
