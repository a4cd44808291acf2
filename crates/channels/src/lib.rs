//! Platform channel integrations: the adapter contract, the shared HTTP
//! connector, per-channel implementations, OAuth token refresh, and the
//! distributed lock used to serialize concurrent bookings.

pub mod adapter;
pub mod connector;
pub mod crypto;
pub mod error;
pub mod oauth;
pub mod redis;

pub mod airbnb;
pub mod booking;
pub mod expedia;
pub mod fewo_direkt;
pub mod google;

pub use adapter::ChannelAdapter;
pub use connector::{parse_timestamp_or_now, HttpConnector};
pub use error::ChannelAdapterError;

pub use airbnb::AirbnbAdapter;
pub use booking::BookingComAdapter;
pub use expedia::ExpediaAdapter;
pub use fewo_direkt::FeWoDirektAdapter;
pub use google::GoogleAdapter;

pub use crypto::{decrypt_if_available, encrypt_if_available, CryptoError, IntegrationCrypto};
pub use oauth::{OAuthEndpoint, OAuthError, RefreshedTokens, TokenRefresher};
pub use redis::{DistributedLock, LockError, LockHandle, LockStore};
