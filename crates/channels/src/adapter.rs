//! The capability surface every channel plugs into: availability, pricing,
//! booking retrieval, and webhook handling, behind one polymorphic trait so
//! the sync engine never branches on which platform it's talking to.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use db::models::{PlatformBooking, WebhookEvent};

use crate::error::ChannelAdapterError;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// One of `db::models::channel_kind`'s constants.
    fn channel_kind(&self) -> &'static str;

    /// Open or close a date range on the platform's calendar.
    async fn update_availability(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        available: bool,
        min_stay: Option<i32>,
        max_stay: Option<i32>,
    ) -> Result<(), ChannelAdapterError>;

    async fn get_availability(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, bool>, ChannelAdapterError>;

    /// Single-date convenience built on [`ChannelAdapter::update_pricing_bulk`].
    async fn update_pricing(
        &self,
        remote_property_id: &str,
        date: NaiveDate,
        price: Decimal,
        currency: &str,
    ) -> Result<(), ChannelAdapterError> {
        let mut date_prices = HashMap::with_capacity(1);
        date_prices.insert(date, price);
        self.update_pricing_bulk(remote_property_id, &date_prices, currency)
            .await
    }

    async fn update_pricing_bulk(
        &self,
        remote_property_id: &str,
        date_prices: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<(), ChannelAdapterError>;

    async fn get_pricing(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, Decimal>, ChannelAdapterError>;

    async fn get_bookings(
        &self,
        remote_property_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformBooking>, ChannelAdapterError>;

    async fn get_booking(
        &self,
        remote_property_id: &str,
        channel_booking_id: &str,
    ) -> Result<PlatformBooking, ChannelAdapterError>;

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<bool, ChannelAdapterError>;

    fn parse_webhook_event(&self, payload: serde_json::Value) -> Result<WebhookEvent, ChannelAdapterError>;
}
