//! Expedia Partner Central platform adapter.
//!
//! REST/JSON throughout, nested under a `roomTypes[].ratePlans[].dates[]`
//! shape that only ever carries a single synthetic "DEFAULT" room type and
//! rate plan for this property model.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use db::models::channel_kind;
use db::models::{booking_status, event_type, PlatformBooking, WebhookEvent};

use crate::adapter::ChannelAdapter;
use crate::connector::HttpConnector;
use crate::error::ChannelAdapterError;

const BASE_URL: &str = "https://services.expediapartnercentral.com/properties";
const PAGE_SIZE: u32 = 100;

pub struct ExpediaAdapter {
    connector: HttpConnector,
}

impl ExpediaAdapter {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            connector: HttpConnector::new(channel_kind::EXPEDIA, BASE_URL, access_token),
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomTypesPayload {
    room_types: Vec<RoomTypePayload>,
}

#[derive(Debug, Serialize)]
struct RoomTypePayload {
    room_type_id: &'static str,
    rate_plans: Vec<RatePlanPayload>,
}

#[derive(Debug, Serialize)]
struct RatePlanPayload {
    rate_plan_id: &'static str,
    dates: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RoomTypesResponse {
    #[serde(default)]
    room_types: Vec<RoomTypeEntry>,
}

#[derive(Debug, Deserialize)]
struct RoomTypeEntry {
    #[serde(default)]
    rate_plans: Vec<RatePlanEntry>,
}

#[derive(Debug, Deserialize)]
struct RatePlanEntry {
    #[serde(default)]
    dates: Vec<DateEntry>,
}

#[derive(Debug, Deserialize)]
struct DateEntry {
    date: NaiveDate,
    #[serde(default = "default_true")]
    available: bool,
    #[serde(default)]
    base_rate: Option<BaseRate>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BaseRate {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct BookingsResponse {
    #[serde(default)]
    bookings: Vec<ExpediaBooking>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExpediaBooking {
    #[serde(default)]
    booking_id: serde_json::Value,
    #[serde(default)]
    property_id: serde_json::Value,
    #[serde(default = "default_pending")]
    status: String,
    #[serde(default)]
    stay_dates: StayDates,
    #[serde(default)]
    primary_guest: PrimaryGuest,
    #[serde(default)]
    guest_counts: GuestCounts,
    #[serde(default)]
    payment: Payment,
    #[serde(default)]
    created_date_time: Option<String>,
    #[serde(default)]
    last_modified_date_time: Option<String>,
    #[serde(default)]
    special_requests: Option<String>,
}

fn default_pending() -> String {
    "PENDING".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PrimaryGuest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<PhoneNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PhoneNumber {
    number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GuestCounts {
    #[serde(default = "default_one")]
    adults: i32,
    #[serde(default)]
    children: i32,
    #[serde(default)]
    infants: i32,
}

fn default_one() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Payment {
    #[serde(default)]
    total_amount: Option<MoneyAmount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MoneyAmount {
    #[serde(default)]
    amount: f64,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn map_status(status: &str) -> &'static str {
    match status.to_uppercase().as_str() {
        "CONFIRMED" => booking_status::CONFIRMED,
        "CANCELLED" => booking_status::CANCELLED,
        "COMPLETED" => booking_status::CHECKED_OUT,
        "NO_SHOW" => booking_status::NO_SHOW,
        "IN_HOUSE" => booking_status::CHECKED_IN,
        _ => booking_status::RESERVED,
    }
}

fn map_event_type(expedia_event: &str) -> &'static str {
    match expedia_event {
        "BOOKING_CREATED" => event_type::BOOKING_CREATED,
        "BOOKING_MODIFIED" => event_type::BOOKING_UPDATED,
        "BOOKING_CANCELLED" => event_type::BOOKING_CANCELLED,
        "BOOKING_COMPLETED" => event_type::BOOKING_CHECKED_OUT,
        "BOOKING_NO_SHOW" => event_type::BOOKING_NO_SHOW,
        _ => event_type::BOOKING_UPDATED,
    }
}

fn booking_into_platform(raw: ExpediaBooking) -> PlatformBooking {
    let total = raw
        .payment
        .total_amount
        .as_ref()
        .map(|m| Decimal::try_from(m.amount).unwrap_or_default())
        .unwrap_or_default();
    let currency = raw
        .payment
        .total_amount
        .map(|m| m.currency)
        .unwrap_or_else(default_currency);

    PlatformBooking {
        channel_kind: channel_kind::EXPEDIA.to_string(),
        channel_booking_id: json_to_id(&raw.booking_id),
        remote_property_id: json_to_id(&raw.property_id),
        guest_name: format!("{} {}", raw.primary_guest.first_name, raw.primary_guest.last_name)
            .trim()
            .to_string(),
        guest_email: raw.primary_guest.email,
        guest_phone: raw.primary_guest.phone.and_then(|p| p.number),
        check_in_date: raw.stay_dates.check_in,
        check_out_date: raw.stay_dates.check_out,
        adults: raw.guest_counts.adults.max(1),
        children: raw.guest_counts.children,
        infants: raw.guest_counts.infants,
        nightly_rate: Decimal::ZERO,
        subtotal: total,
        fees: Decimal::ZERO,
        taxes: Decimal::ZERO,
        total,
        currency,
        status: map_status(&raw.status).to_string(),
        updated_at: crate::connector::parse_timestamp_or_now(raw.last_modified_date_time.as_deref()),
        raw_payload: serde_json::json!({
            "created_date_time": raw.created_date_time,
            "last_modified_date_time": raw.last_modified_date_time,
            "special_requests": raw.special_requests,
        }),
    }
}

fn json_to_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ExpediaWebhookPayload {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    property_id: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[async_trait]
impl ChannelAdapter for ExpediaAdapter {
    fn channel_kind(&self) -> &'static str {
        channel_kind::EXPEDIA
    }

    async fn update_availability(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        available: bool,
        min_stay: Option<i32>,
        max_stay: Option<i32>,
    ) -> Result<(), ChannelAdapterError> {
        let mut dates = Vec::new();
        let mut current = start_date;
        while current < end_date {
            dates.push(serde_json::json!({
                "date": current.to_string(),
                "available": available,
                "minLOS": min_stay.unwrap_or(1),
                "maxLOS": max_stay.unwrap_or(365),
            }));
            current += chrono::Duration::days(1);
        }

        let payload = RoomTypesPayload {
            room_types: vec![RoomTypePayload {
                room_type_id: "DEFAULT",
                rate_plans: vec![RatePlanPayload {
                    rate_plan_id: "DEFAULT",
                    dates,
                }],
            }],
        };

        let path = format!("/{remote_property_id}/availability");
        self.connector
            .execute_json::<serde_json::Value, _>(reqwest::Method::PUT, &path, Some(&payload), None)
            .await?;
        Ok(())
    }

    async fn get_availability(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, bool>, ChannelAdapterError> {
        let path = format!("/{remote_property_id}/availability");
        let query = [
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];
        let resp: RoomTypesResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await?;

        let mut availability = HashMap::new();
        for room_type in resp.room_types {
            for rate_plan in room_type.rate_plans {
                for day in rate_plan.dates {
                    availability.insert(day.date, day.available);
                }
            }
        }
        Ok(availability)
    }

    async fn update_pricing_bulk(
        &self,
        remote_property_id: &str,
        date_prices: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<(), ChannelAdapterError> {
        let mut dates: Vec<_> = date_prices.iter().collect();
        dates.sort_by_key(|(d, _)| **d);

        let dates_json = dates
            .into_iter()
            .map(|(date, price)| {
                serde_json::json!({
                    "date": date.to_string(),
                    "baseRate": {
                        "amount": price.to_string().parse::<f64>().unwrap_or(0.0),
                        "currency": currency,
                    }
                })
            })
            .collect();

        let payload = RoomTypesPayload {
            room_types: vec![RoomTypePayload {
                room_type_id: "DEFAULT",
                rate_plans: vec![RatePlanPayload {
                    rate_plan_id: "DEFAULT",
                    dates: dates_json,
                }],
            }],
        };

        let path = format!("/{remote_property_id}/rates");
        self.connector
            .execute_json::<serde_json::Value, _>(reqwest::Method::PUT, &path, Some(&payload), None)
            .await?;
        Ok(())
    }

    async fn get_pricing(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, Decimal>, ChannelAdapterError> {
        let path = format!("/{remote_property_id}/rates");
        let query = [
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];
        let resp: RoomTypesResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await?;

        let mut pricing = HashMap::new();
        for room_type in resp.room_types {
            for rate_plan in room_type.rate_plans {
                for day in rate_plan.dates {
                    if let Some(rate) = day.base_rate {
                        pricing.insert(day.date, Decimal::try_from(rate.amount).unwrap_or_default());
                    }
                }
            }
        }
        Ok(pricing)
    }

    async fn get_bookings(
        &self,
        remote_property_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformBooking>, ChannelAdapterError> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;
        let path = format!("/{remote_property_id}/bookings");

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(since) = since {
                query.push(("modifiedSince", format!("{}Z", since.to_rfc3339())));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp: BookingsResponse = self
                .connector
                .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&query))
                .await?;

            let count = resp.bookings.len();
            all.extend(resp.bookings.into_iter().map(booking_into_platform));

            match resp.next_page_token {
                Some(token) if count >= PAGE_SIZE as usize => page_token = Some(token),
                _ => break,
            }
        }

        Ok(all)
    }

    async fn get_booking(
        &self,
        remote_property_id: &str,
        channel_booking_id: &str,
    ) -> Result<PlatformBooking, ChannelAdapterError> {
        let path = format!("/{remote_property_id}/bookings/{channel_booking_id}");
        let raw: ExpediaBooking = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, None)
            .await?;
        Ok(booking_into_platform(raw))
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<bool, ChannelAdapterError> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let Ok(signature_bytes) = hex::decode(signature) else {
            return Ok(false);
        };
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| ChannelAdapterError::Configuration(e.to_string()))?;
        mac.update(payload);
        Ok(mac.verify_slice(&signature_bytes).is_ok())
    }

    fn parse_webhook_event(&self, payload: serde_json::Value) -> Result<WebhookEvent, ChannelAdapterError> {
        let parsed: ExpediaWebhookPayload = serde_json::from_value(payload.clone())
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let occurred_at = parsed
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(WebhookEvent {
            channel_kind: channel_kind::EXPEDIA.to_string(),
            event_type: map_event_type(&parsed.event_type).to_string(),
            event_id: parsed.event_id,
            remote_property_id: parsed.property_id,
            occurred_at,
            raw_payload: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_house_maps_to_checked_in() {
        assert_eq!(map_status("IN_HOUSE"), booking_status::CHECKED_IN);
    }

    #[test]
    fn unknown_status_defaults_to_reserved() {
        assert_eq!(map_status("SOMETHING_NEW"), booking_status::RESERVED);
    }

    #[test]
    fn booking_completed_maps_to_checked_out_event() {
        assert_eq!(map_event_type("BOOKING_COMPLETED"), event_type::BOOKING_CHECKED_OUT);
    }

    #[test]
    fn json_to_id_unwraps_string_values() {
        assert_eq!(json_to_id(&serde_json::json!("abc-123")), "abc-123");
        assert_eq!(json_to_id(&serde_json::json!(42)), "42");
    }
}
