//! FeWo-direkt / Vrbo platform adapter.
//!
//! REST/JSON, cursor-paginated reservations, and instant-booking accept and
//! decline endpoints that the other four channels don't have.

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

const BASE_URL: &str = "https://api.vrbo.com/v2";
const PAGE_SIZE: u32 = 50;

pub struct FeWoDirektAdapter {
    connector: HttpConnector,
}

impl FeWoDirektAdapter {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            connector: HttpConnector::new(channel_kind::FEWO_DIREKT, BASE_URL, access_token),
        }
    }

    /// Vrbo auto-confirms instant bookings; the host still has to ack them.
    pub async fn accept_instant_booking(&self, reservation_id: &str) -> Result<serde_json::Value, ChannelAdapterError> {
        let path = format!("/reservations/{reservation_id}/accept");
        self.connector
            .execute_json::<serde_json::Value, ()>(reqwest::Method::POST, &path, None, None)
            .await
    }

    pub async fn decline_booking(
        &self,
        reservation_id: &str,
        reason: &str,
    ) -> Result<serde_json::Value, ChannelAdapterError> {
        let path = format!("/reservations/{reservation_id}/decline");
        let body = serde_json::json!({ "reason": reason });
        self.connector
            .execute_json(reqwest::Method::POST, &path, Some(&body), None)
            .await
    }
}

#[derive(Debug, Serialize)]
struct CalendarEntry {
    date: String,
    availability: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_stay: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_stay: Option<i32>,
}

#[derive(Debug, Serialize)]
struct CalendarPayload {
    calendar_entries: Vec<CalendarEntry>,
}

#[derive(Debug, Deserialize)]
struct CalendarResponse {
    #[serde(default)]
    calendar_entries: Vec<CalendarEntryResponse>,
}

#[derive(Debug, Deserialize)]
struct CalendarEntryResponse {
    date: NaiveDate,
    #[serde(default)]
    availability: String,
}

#[derive(Debug, Serialize)]
struct RateEntry {
    date: String,
    nightly_rate: NightlyRate,
}

#[derive(Debug, Serialize)]
struct NightlyRate {
    amount: f64,
    currency: String,
}

#[derive(Debug, Serialize)]
struct RatesPayload {
    rate_entries: Vec<RateEntry>,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rate_entries: Vec<RateEntryResponse>,
}

#[derive(Debug, Deserialize)]
struct RateEntryResponse {
    date: NaiveDate,
    #[serde(default)]
    nightly_rate: Option<NightlyRateResponse>,
}

#[derive(Debug, Deserialize)]
struct NightlyRateResponse {
    #[serde(default)]
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ReservationsResponse {
    #[serde(default)]
    reservations: Vec<VrboReservation>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VrboReservation {
    #[serde(default)]
    reservation_id: serde_json::Value,
    #[serde(default)]
    listing_id: serde_json::Value,
    #[serde(default = "default_tentative")]
    status: String,
    #[serde(default)]
    stay_details: StayDetails,
    #[serde(default)]
    guest: VrboGuest,
    #[serde(default)]
    pricing: VrboPricing,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    guest_message: Option<String>,
}

fn default_tentative() -> String {
    "tentative".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StayDetails {
    check_in: NaiveDate,
    check_out: NaiveDate,
    #[serde(default)]
    guests: GuestCounts,
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
struct VrboGuest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VrboPricing {
    #[serde(default)]
    total: Option<MoneyAmount>,
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

fn map_status(vrbo_status: &str) -> &'static str {
    match vrbo_status.to_lowercase().as_str() {
        "booked" | "confirmed" => booking_status::CONFIRMED,
        "cancelled" | "cancelled_by_guest" | "cancelled_by_owner" | "expired" => booking_status::CANCELLED,
        "declined" => booking_status::DECLINED,
        _ => booking_status::RESERVED,
    }
}

fn map_event_type(vrbo_event: &str) -> &'static str {
    match vrbo_event {
        "RESERVATION_CREATED" | "INSTANT_BOOK_CREATED" => event_type::BOOKING_CREATED,
        "RESERVATION_MODIFIED" => event_type::BOOKING_UPDATED,
        "RESERVATION_CANCELLED" => event_type::BOOKING_CANCELLED,
        _ => event_type::BOOKING_UPDATED,
    }
}

fn json_to_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

fn reservation_into_booking(res: VrboReservation) -> PlatformBooking {
    let total = res
        .pricing
        .total
        .as_ref()
        .map(|m| Decimal::try_from(m.amount).unwrap_or_default())
        .unwrap_or_default();
    let currency = res.pricing.total.map(|m| m.currency).unwrap_or_else(default_currency);

    PlatformBooking {
        channel_kind: channel_kind::FEWO_DIREKT.to_string(),
        channel_booking_id: json_to_id(&res.reservation_id),
        remote_property_id: json_to_id(&res.listing_id),
        guest_name: format!("{} {}", res.guest.first_name, res.guest.last_name).trim().to_string(),
        guest_email: res.guest.email,
        guest_phone: res.guest.phone,
        check_in_date: res.stay_details.check_in,
        check_out_date: res.stay_details.check_out,
        adults: res.stay_details.guests.adults.max(1),
        children: res.stay_details.guests.children,
        infants: res.stay_details.guests.infants,
        nightly_rate: Decimal::ZERO,
        subtotal: total,
        fees: Decimal::ZERO,
        taxes: Decimal::ZERO,
        total,
        currency,
        status: map_status(&res.status).to_string(),
        updated_at: crate::connector::parse_timestamp_or_now(res.modified_at.as_deref()),
        raw_payload: serde_json::json!({
            "created_at": res.created_at,
            "modified_at": res.modified_at,
            "guest_message": res.guest_message,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct VrboWebhookPayload {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    unit_id: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[async_trait]
impl ChannelAdapter for FeWoDirektAdapter {
    fn channel_kind(&self) -> &'static str {
        channel_kind::FEWO_DIREKT
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
        let mut entries = Vec::new();
        let mut current = start_date;
        while current < end_date {
            entries.push(CalendarEntry {
                date: current.to_string(),
                availability: if available { "AVAILABLE" } else { "UNAVAILABLE" },
                minimum_stay: min_stay,
                maximum_stay: max_stay,
            });
            current += chrono::Duration::days(1);
        }

        let path = format!("/listings/{remote_property_id}/calendar");
        let payload = CalendarPayload { calendar_entries: entries };
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
        let path = format!("/listings/{remote_property_id}/calendar");
        let query = [
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];
        let resp: CalendarResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await?;

        Ok(resp
            .calendar_entries
            .into_iter()
            .map(|e| (e.date, e.availability == "AVAILABLE"))
            .collect())
    }

    async fn update_pricing_bulk(
        &self,
        remote_property_id: &str,
        date_prices: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<(), ChannelAdapterError> {
        let mut dates: Vec<_> = date_prices.iter().collect();
        dates.sort_by_key(|(d, _)| **d);

        let rate_entries = dates
            .into_iter()
            .map(|(date, price)| RateEntry {
                date: date.to_string(),
                nightly_rate: NightlyRate {
                    amount: price.to_string().parse::<f64>().unwrap_or(0.0),
                    currency: currency.to_string(),
                },
            })
            .collect();

        let path = format!("/listings/{remote_property_id}/rates");
        let payload = RatesPayload { rate_entries };
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
        let path = format!("/listings/{remote_property_id}/rates");
        let query = [
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];
        let resp: RatesResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await?;

        Ok(resp
            .rate_entries
            .into_iter()
            .map(|e| {
                let amount = e.nightly_rate.map(|r| r.amount).unwrap_or(0.0);
                (e.date, Decimal::try_from(amount).unwrap_or_default())
            })
            .collect())
    }

    async fn get_bookings(
        &self,
        remote_property_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformBooking>, ChannelAdapterError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("listingId", remote_property_id.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(since) = since {
                query.push(("modifiedAfter", format!("{}Z", since.to_rfc3339())));
            }
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let resp: ReservationsResponse = self
                .connector
                .execute_json::<_, ()>(reqwest::Method::GET, "/reservations", None, Some(&query))
                .await?;

            let count = resp.reservations.len();
            all.extend(resp.reservations.into_iter().map(reservation_into_booking));

            let next_cursor = resp.pagination.and_then(|p| p.next_cursor);
            match next_cursor {
                Some(next) if count >= PAGE_SIZE as usize => cursor = Some(next),
                _ => break,
            }
        }

        Ok(all)
    }

    async fn get_booking(
        &self,
        _remote_property_id: &str,
        channel_booking_id: &str,
    ) -> Result<PlatformBooking, ChannelAdapterError> {
        let path = format!("/reservations/{channel_booking_id}");
        let raw: VrboReservation = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, None)
            .await?;
        Ok(reservation_into_booking(raw))
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
        let parsed: VrboWebhookPayload = serde_json::from_value(payload.clone())
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let occurred_at = parsed
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(WebhookEvent {
            channel_kind: channel_kind::FEWO_DIREKT.to_string(),
            event_type: map_event_type(&parsed.event_type).to_string(),
            event_id: parsed.event_id,
            remote_property_id: parsed.unit_id,
            occurred_at,
            raw_payload: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_reservations_map_to_cancelled() {
        assert_eq!(map_status("expired"), booking_status::CANCELLED);
    }

    #[test]
    fn declined_stays_declined() {
        assert_eq!(map_status("declined"), booking_status::DECLINED);
    }

    #[test]
    fn instant_book_created_maps_to_booking_created() {
        assert_eq!(map_event_type("INSTANT_BOOK_CREATED"), event_type::BOOKING_CREATED);
    }
}
