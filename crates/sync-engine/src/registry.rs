//! Resolves a channel kind and decrypted access token into the matching
//! [`ChannelAdapter`] implementation.

use std::sync::Arc;

use channels::{AirbnbAdapter, BookingComAdapter, ChannelAdapter, ExpediaAdapter, FeWoDirektAdapter, GoogleAdapter};
use db::models::channel_kind;

/// `account_id` is only consulted for Google, whose ARI writes are scoped
/// to a merchant account rather than a bare property id.
pub fn adapter_for(
    channel_kind: &str,
    access_token: &str,
    account_id: Option<&str>,
) -> Option<Arc<dyn ChannelAdapter>> {
    match channel_kind {
        channel_kind::AIRBNB => Some(Arc::new(AirbnbAdapter::new(access_token.to_string()))),
        channel_kind::BOOKING_COM => Some(Arc::new(BookingComAdapter::new(access_token.to_string()))),
        channel_kind::EXPEDIA => Some(Arc::new(ExpediaAdapter::new(access_token.to_string()))),
        channel_kind::FEWO_DIREKT => Some(Arc::new(FeWoDirektAdapter::new(access_token.to_string()))),
        channel_kind::GOOGLE => Some(Arc::new(GoogleAdapter::new(
            access_token.to_string(),
            account_id.unwrap_or_default().to_string(),
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_kind_resolves_to_none() {
        assert!(adapter_for("unknown", "token", None).is_none());
    }

    #[test]
    fn every_canonical_channel_kind_resolves() {
        for kind in channel_kind::ALL {
            assert!(adapter_for(kind, "token", Some("acct")).is_some());
        }
    }
}
