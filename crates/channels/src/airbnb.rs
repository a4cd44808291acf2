//! Airbnb platform adapter.
//!
//! REST + JSON throughout. Availability and pricing share one calendar
//! endpoint; reservations are paginated with `_limit`/`_offset`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use db::models::channel_kind;
use db::models::{booking_status, event_type, PlatformBooking, WebhookEvent};

use crate::adapter::ChannelAdapter;
use crate::connector::HttpConnector;
use crate::error::ChannelAdapterError;

const BASE_URL: &str = "https://api.airbnb.com/v2";
const PAGE_SIZE: u32 = 50;

pub struct AirbnbAdapter {
    connector: HttpConnector,
}

impl AirbnbAdapter {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            connector: HttpConnector::new(channel_kind::AIRBNB, BASE_URL, access_token),
        }
    }
}

#[derive(Debug, Serialize)]
struct CalendarDay {
    date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_nights: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_nights: Option<i32>,
}

#[derive(Debug, Serialize)]
struct CalendarUpdateRequest {
    calendar: CalendarDays,
}

#[derive(Debug, Serialize)]
struct CalendarDays {
    days: Vec<CalendarDay>,
}

#[derive(Debug, Deserialize)]
struct CalendarResponse {
    calendar: CalendarBody,
}

#[derive(Debug, Deserialize)]
struct CalendarBody {
    #[serde(default)]
    days: Vec<CalendarDayResponse>,
}

#[derive(Debug, Deserialize)]
struct CalendarDayResponse {
    date: NaiveDate,
    #[serde(default = "default_true")]
    available: bool,
    #[serde(default)]
    price: Option<PriceField>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceField {
    Amount(f64),
    Object { amount: f64 },
}

impl PriceField {
    fn amount(&self) -> f64 {
        match self {
            PriceField::Amount(a) => *a,
            PriceField::Object { amount } => *amount,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReservationsResponse {
    #[serde(default)]
    reservations: Vec<AirbnbReservation>,
}

#[derive(Debug, Deserialize)]
struct SingleReservationResponse {
    reservation: AirbnbReservation,
}

#[derive(Debug, Deserialize)]
struct AirbnbReservation {
    confirmation_code: String,
    listing_id: serde_json::Value,
    #[serde(default)]
    status: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(default)]
    guest: AirbnbGuest,
    #[serde(default)]
    pricing_quote: AirbnbPricing,
    #[serde(default)]
    number_of_adults: i32,
    #[serde(default)]
    number_of_children: i32,
    #[serde(default)]
    number_of_infants: i32,
    #[serde(default)]
    guest_message: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
struct AirbnbGuest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AirbnbPricing {
    #[serde(default)]
    total: AirbnbAmount,
    #[serde(default)]
    host_fee: AirbnbAmount,
    #[serde(default)]
    occupancy_taxes: AirbnbAmount,
}

#[derive(Debug, Default, Deserialize)]
struct AirbnbAmount {
    #[serde(default)]
    amount: f64,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Deserialize)]
struct AirbnbWebhookPayload {
    event_type: String,
    event_id: String,
    #[serde(default)]
    listing_id: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn map_status(airbnb_status: &str) -> &'static str {
    match airbnb_status {
        "accepted" => booking_status::CONFIRMED,
        "declined" => booking_status::DECLINED,
        "cancelled" => booking_status::CANCELLED,
        "checked_out" => booking_status::CHECKED_OUT,
        _ => booking_status::RESERVED,
    }
}

fn map_event_type(airbnb_event: &str) -> &'static str {
    match airbnb_event {
        "reservation.created" => event_type::BOOKING_CREATED,
        "reservation.accepted" => event_type::BOOKING_CONFIRMED,
        "reservation.declined" => event_type::BOOKING_DECLINED,
        "reservation.cancelled" | "reservation.cancelled_by_host" | "reservation.cancelled_by_guest" => {
            event_type::BOOKING_CANCELLED
        }
        "reservation.checkout_completed" => event_type::BOOKING_CHECKED_OUT,
        _ => event_type::BOOKING_UPDATED,
    }
}

fn reservation_into_booking(res: AirbnbReservation) -> PlatformBooking {
    let subtotal = Decimal::try_from(res.pricing_quote.total.amount).unwrap_or_default();
    let fees = Decimal::try_from(res.pricing_quote.host_fee.amount).unwrap_or_default();
    let taxes = Decimal::try_from(res.pricing_quote.occupancy_taxes.amount).unwrap_or_default();
    let total = subtotal + fees + taxes;
    let guest_name = format!("{} {}", res.guest.first_name, res.guest.last_name)
        .trim()
        .to_string();

    PlatformBooking {
        channel_kind: channel_kind::AIRBNB.to_string(),
        channel_booking_id: res.confirmation_code,
        remote_property_id: res.listing_id.as_str().map(str::to_string).unwrap_or_else(|| res.listing_id.to_string()),
        guest_name,
        guest_email: res.guest.email,
        guest_phone: res.guest.phone,
        check_in_date: res.start_date,
        check_out_date: res.end_date,
        adults: res.number_of_adults.max(1),
        children: res.number_of_children,
        infants: res.number_of_infants,
        nightly_rate: Decimal::ZERO,
        subtotal,
        fees,
        taxes,
        total,
        currency: res.pricing_quote.total.currency,
        status: map_status(&res.status).to_string(),
        updated_at: crate::connector::parse_timestamp_or_now(Some(res.updated_at.as_str())),
        raw_payload: serde_json::json!({
            "created_at": res.created_at,
            "updated_at": res.updated_at,
            "guest_message": res.guest_message,
        }),
    }
}

#[async_trait]
impl ChannelAdapter for AirbnbAdapter {
    fn channel_kind(&self) -> &'static str {
        channel_kind::AIRBNB
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
        let path = format!("/listings/{remote_property_id}/calendar");
        let payload = CalendarUpdateRequest {
            calendar: CalendarDays {
                days: vec![CalendarDay {
                    date: start_date.to_string(),
                    available: Some(available),
                    price: None,
                    currency: None,
                    min_nights: min_stay,
                    max_nights: max_stay,
                }],
            },
        };
        let _: serde_json::Value = self
            .connector
            .execute_json(reqwest::Method::PUT, &path, Some(&payload), Some(&[
                ("start_date", start_date.to_string()),
                ("end_date", end_date.to_string()),
            ]))
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
        let resp: CalendarResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&[
                ("start_date", start_date.to_string()),
                ("end_date", end_date.to_string()),
            ]))
            .await?;

        Ok(resp
            .calendar
            .days
            .into_iter()
            .map(|d| (d.date, d.available))
            .collect())
    }

    async fn update_pricing_bulk(
        &self,
        remote_property_id: &str,
        date_prices: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<(), ChannelAdapterError> {
        let path = format!("/listings/{remote_property_id}/calendar");
        let mut days: Vec<CalendarDay> = date_prices
            .iter()
            .map(|(date, price)| CalendarDay {
                date: date.to_string(),
                available: None,
                price: Some(price.to_string().parse().unwrap_or(0.0)),
                currency: Some(currency.to_string()),
                min_nights: None,
                max_nights: None,
            })
            .collect();
        days.sort_by(|a, b| a.date.cmp(&b.date));

        let payload = CalendarUpdateRequest {
            calendar: CalendarDays { days },
        };
        let _: serde_json::Value = self
            .connector
            .execute_json::<_, _>(reqwest::Method::PUT, &path, Some(&payload), None)
            .await?;
        Ok(())
    }

    async fn get_pricing(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, Decimal>, ChannelAdapterError> {
        let path = format!("/listings/{remote_property_id}/calendar");
        let resp: CalendarResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, Some(&[
                ("start_date", start_date.to_string()),
                ("end_date", end_date.to_string()),
            ]))
            .await?;

        Ok(resp
            .calendar
            .days
            .into_iter()
            .filter_map(|d| {
                d.price
                    .map(|p| (d.date, Decimal::try_from(p.amount()).unwrap_or_default()))
            })
            .collect())
    }

    async fn get_bookings(
        &self,
        remote_property_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformBooking>, ChannelAdapterError> {
        let mut all = Vec::new();
        let mut offset = 0u32;

        loop {
            let mut query = vec![
                ("listing_id", remote_property_id.to_string()),
                ("_limit", PAGE_SIZE.to_string()),
                ("_offset", offset.to_string()),
            ];
            if let Some(since) = since {
                query.push(("_updated_at_min", since.to_rfc3339()));
            }

            let resp: ReservationsResponse = self
                .connector
                .execute_json::<_, ()>(reqwest::Method::GET, "/reservations", None, Some(&query))
                .await?;

            let count = resp.reservations.len();
            all.extend(resp.reservations.into_iter().map(reservation_into_booking));

            if count < PAGE_SIZE as usize {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(all)
    }

    async fn get_booking(
        &self,
        _remote_property_id: &str,
        channel_booking_id: &str,
    ) -> Result<PlatformBooking, ChannelAdapterError> {
        let path = format!("/reservations/{channel_booking_id}");
        let resp: SingleReservationResponse = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, None)
            .await?;
        Ok(reservation_into_booking(resp.reservation))
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<bool, ChannelAdapterError> {
        let Ok(signature_bytes) = hex::decode(signature) else {
            return Ok(false);
        };
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| ChannelAdapterError::Configuration(e.to_string()))?;
        mac.update(payload);
        Ok(mac.verify_slice(&signature_bytes).is_ok())
    }

    fn parse_webhook_event(&self, payload: serde_json::Value) -> Result<WebhookEvent, ChannelAdapterError> {
        let parsed: AirbnbWebhookPayload = serde_json::from_value(payload.clone())
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        Ok(WebhookEvent {
            channel_kind: channel_kind::AIRBNB.to_string(),
            event_type: map_event_type(&parsed.event_type).to_string(),
            event_id: parsed.event_id,
            remote_property_id: parsed.listing_id,
            occurred_at: parsed.timestamp.unwrap_or_else(Utc::now),
            raw_payload: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_status_maps_to_canonical() {
        assert_eq!(map_status("accepted"), booking_status::CONFIRMED);
        assert_eq!(map_status("declined"), booking_status::DECLINED);
        assert_eq!(map_status("pending"), booking_status::RESERVED);
    }

    #[test]
    fn webhook_signature_rejects_wrong_secret() {
        let adapter = AirbnbAdapter::new("token");
        let payload = b"{\"event_type\":\"reservation.created\"}";
        let mut mac = Hmac::<Sha256>::new_from_slice(b"right-secret").unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(adapter
            .verify_webhook_signature(payload, &signature, "right-secret")
            .unwrap());
        assert!(!adapter
            .verify_webhook_signature(payload, &signature, "wrong-secret")
            .unwrap());
    }

    #[test]
    fn cancelled_by_host_and_guest_both_map_to_cancelled() {
        assert_eq!(map_event_type("reservation.cancelled_by_host"), event_type::BOOKING_CANCELLED);
        assert_eq!(map_event_type("reservation.cancelled_by_guest"), event_type::BOOKING_CANCELLED);
    }
}
