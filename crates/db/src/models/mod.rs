//! Persisted and transient entities for the channel manager domain.

pub mod booking;
pub mod calendar_cell;
pub mod channel_connection;
pub mod guest;
pub mod property;
pub mod sync_log;

pub use booking::*;
pub use calendar_cell::*;
pub use channel_connection::*;
pub use guest::*;
pub use property::*;
pub use sync_log::*;

pub(crate) fn default_true() -> bool {
    true
}
