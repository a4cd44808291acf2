//! Google Vacation Rentals (Travel Partner API) platform adapter.
//!
//! Google's API is write-heavy: availability and pricing updates go out as
//! ARI transactions, but reads of the same data frequently aren't supported
//! and degrade to an empty result rather than a hard failure. Webhooks
//! arrive wrapped in a Pub/Sub envelope and are authenticated with a JWT
//! instead of an HMAC signature.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use db::models::channel_kind;
use db::models::{booking_status, event_type, PlatformBooking, WebhookEvent};

use crate::adapter::ChannelAdapter;
use crate::connector::HttpConnector;
use crate::error::ChannelAdapterError;

const BASE_URL: &str = "https://travelpartner.googleapis.com/v3";
const JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

pub struct GoogleAdapter {
    connector: HttpConnector,
    account_id: String,
    jwks_cache: RwLock<HashMap<String, DecodingKey>>,
    http: reqwest::Client,
}

impl GoogleAdapter {
    pub fn new(access_token: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            connector: HttpConnector::new(channel_kind::GOOGLE, BASE_URL, access_token),
            account_id: account_id.into(),
            jwks_cache: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }

    fn transactions_path(&self) -> String {
        format!("/accounts/{}/transactions", self.account_id)
    }

    fn build_ari_transaction(
        &self,
        property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        available: Option<bool>,
        min_stay: Option<i32>,
        max_stay: Option<i32>,
        price: Option<(Decimal, &str)>,
    ) -> serde_json::Value {
        let mut entries = Vec::new();
        let mut current = start_date;
        while current < end_date {
            let mut entry = serde_json::json!({ "date": current.to_string() });
            if let Some(available) = available {
                entry["availability"] = serde_json::json!(if available { 1 } else { 0 });
            }
            if let Some(min_stay) = min_stay {
                entry["minimumLengthOfStay"] = serde_json::json!(min_stay);
            }
            if let Some(max_stay) = max_stay {
                entry["maximumLengthOfStay"] = serde_json::json!(max_stay);
            }
            if let Some((price, currency)) = price {
                entry["rate"] = serde_json::json!({ "amount": price.to_string(), "currency": currency });
            }
            entries.push(entry);
            current += chrono::Duration::days(1);
        }

        serde_json::json!({
            "propertyId": property_id,
            "roomType": "DEFAULT",
            "ratePlan": "DEFAULT",
            "inventoryUpdates": entries,
        })
    }

    /// Pulls Google's signing keys so `verify_webhook_signature` can run
    /// synchronously against a warm cache. Call this on a schedule; a cache
    /// miss fails closed rather than blocking on a network round trip.
    pub async fn refresh_jwks(&self) -> Result<(), ChannelAdapterError> {
        let response = self
            .http
            .get(JWKS_URL)
            .send()
            .await
            .map_err(|e| ChannelAdapterError::Transient {
                channel: channel_kind::GOOGLE.to_string(),
                message: e.to_string(),
            })?;

        let jwk_set: JwkSet = response
            .json()
            .await
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let mut cache = HashMap::new();
        for jwk in &jwk_set.keys {
            if let Some(kid) = &jwk.common.key_id {
                if let Ok(key) = DecodingKey::from_jwk(jwk) {
                    cache.insert(kid.clone(), key);
                }
            }
        }

        *self.jwks_cache.write().expect("jwks cache lock poisoned") = cache;
        Ok(())
    }

    fn generate_ari_xml_feed(
        &self,
        property_id: &str,
        availability_data: &HashMap<NaiveDate, bool>,
        pricing_data: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<String, ChannelAdapterError> {
        use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
        use quick_xml::Writer;
        use std::io::Cursor;

        let mut buf = Vec::new();
        let mut writer = Writer::new(Cursor::new(&mut buf));

        let mut root = BytesStart::new("Transaction");
        let timestamp = format!("{}Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.f"));
        let txn_id = format!("txn-{}", Utc::now().format("%Y%m%d%H%M%S"));
        root.push_attribute(("timestamp", timestamp.as_str()));
        root.push_attribute(("id", txn_id.as_str()));
        writer.write_event(Event::Start(root)).map_err(xml_write_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("PropertyDataSet")))
            .map_err(xml_write_err)?;
        let mut prop = BytesStart::new("Property");
        prop.push_attribute(("id", property_id));
        writer.write_event(Event::Start(prop)).map_err(xml_write_err)?;

        let mut room_data = BytesStart::new("RoomData");
        room_data.push_attribute(("room_id", "DEFAULT"));
        writer.write_event(Event::Start(room_data)).map_err(xml_write_err)?;

        let mut avail_dates: Vec<_> = availability_data.iter().collect();
        avail_dates.sort_by_key(|(d, _)| **d);
        for (date, available) in avail_dates {
            writer.write_event(Event::Start(BytesStart::new("Inventory"))).map_err(xml_write_err)?;
            write_text_element(&mut writer, "Date", &date.to_string())?;
            write_text_element(&mut writer, "Availability", if *available { "1" } else { "0" })?;
            writer.write_event(Event::End(BytesEnd::new("Inventory"))).map_err(xml_write_err)?;
        }

        let mut rate_dates: Vec<_> = pricing_data.iter().collect();
        rate_dates.sort_by_key(|(d, _)| **d);
        for (date, price) in rate_dates {
            writer.write_event(Event::Start(BytesStart::new("Rate"))).map_err(xml_write_err)?;
            write_text_element(&mut writer, "Date", &date.to_string())?;
            let mut base_rate = BytesStart::new("BaseRate");
            base_rate.push_attribute(("currency", currency));
            writer.write_event(Event::Start(base_rate)).map_err(xml_write_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&price.to_string())))
                .map_err(xml_write_err)?;
            writer.write_event(Event::End(BytesEnd::new("BaseRate"))).map_err(xml_write_err)?;
            writer.write_event(Event::End(BytesEnd::new("Rate"))).map_err(xml_write_err)?;
        }

        writer.write_event(Event::End(BytesEnd::new("RoomData"))).map_err(xml_write_err)?;
        writer.write_event(Event::End(BytesEnd::new("Property"))).map_err(xml_write_err)?;
        writer.write_event(Event::End(BytesEnd::new("PropertyDataSet"))).map_err(xml_write_err)?;
        writer.write_event(Event::End(BytesEnd::new("Transaction"))).map_err(xml_write_err)?;

        String::from_utf8(buf).map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))
    }

    pub async fn upload_ari_feed(
        &self,
        availability_data: &HashMap<NaiveDate, bool>,
        pricing_data: &HashMap<NaiveDate, Decimal>,
        property_id: &str,
        currency: &str,
    ) -> Result<String, ChannelAdapterError> {
        let xml = self.generate_ari_xml_feed(property_id, availability_data, pricing_data, currency)?;
        let path = format!("/accounts/{}/ariFeed", self.account_id);
        self.connector.execute_xml(&path, xml).await
    }
}

fn write_text_element(
    writer: &mut quick_xml::Writer<std::io::Cursor<&mut Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), ChannelAdapterError> {
    use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_write_err)?;
    writer.write_event(Event::Text(BytesText::new(text))).map_err(xml_write_err)?;
    writer.write_event(Event::End(BytesEnd::new(name))).map_err(xml_write_err)?;
    Ok(())
}

fn xml_write_err(e: quick_xml::Error) -> ChannelAdapterError {
    ChannelAdapterError::MalformedResponse(e.to_string())
}

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    inventory: Vec<InventoryEntry>,
}

#[derive(Debug, Deserialize)]
struct InventoryEntry {
    date: NaiveDate,
    #[serde(default)]
    availability: i32,
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: Vec<RateEntry>,
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    date: NaiveDate,
    #[serde(default)]
    rate: Option<RateAmount>,
}

#[derive(Debug, Deserialize)]
struct RateAmount {
    #[serde(default)]
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct BookingsResponse {
    #[serde(default)]
    bookings: Vec<GoogleBooking>,
}

#[derive(Debug, Clone, Deserialize)]
struct GoogleBooking {
    #[serde(default)]
    booking_id: serde_json::Value,
    #[serde(default)]
    property_id: serde_json::Value,
    #[serde(default = "default_confirmed")]
    status: String,
    #[serde(default)]
    stay: GoogleStay,
    #[serde(default)]
    guest: GoogleGuest,
    #[serde(default)]
    pricing: GooglePricing,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    modified_time: Option<String>,
    #[serde(default)]
    special_requests: Option<String>,
}

fn default_confirmed() -> String {
    "CONFIRMED".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GoogleStay {
    check_in: NaiveDate,
    check_out: NaiveDate,
    #[serde(default = "default_two")]
    number_of_adults: i32,
    #[serde(default)]
    number_of_children: i32,
}

fn default_two() -> i32 {
    2
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GoogleGuest {
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
struct GooglePricing {
    #[serde(default)]
    total_price: Option<MoneyAmount>,
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

fn json_to_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

fn map_status(google_status: &str) -> &'static str {
    match google_status.to_uppercase().as_str() {
        "CANCELLED" => booking_status::CANCELLED,
        "COMPLETED" => booking_status::CHECKED_OUT,
        "NO_SHOW" => booking_status::NO_SHOW,
        _ => booking_status::CONFIRMED,
    }
}

fn map_event_type(google_event: &str) -> &'static str {
    match google_event {
        "BOOKING_CREATED" => event_type::BOOKING_CREATED,
        "BOOKING_MODIFIED" => event_type::BOOKING_UPDATED,
        "BOOKING_CANCELLED" => event_type::BOOKING_CANCELLED,
        _ => event_type::BOOKING_UPDATED,
    }
}

fn booking_into_platform(raw: GoogleBooking) -> PlatformBooking {
    let total = raw
        .pricing
        .total_price
        .as_ref()
        .map(|m| Decimal::try_from(m.amount).unwrap_or_default())
        .unwrap_or_default();
    let currency = raw.pricing.total_price.map(|m| m.currency).unwrap_or_else(default_currency);

    PlatformBooking {
        channel_kind: channel_kind::GOOGLE.to_string(),
        channel_booking_id: json_to_id(&raw.booking_id),
        remote_property_id: json_to_id(&raw.property_id),
        guest_name: format!("{} {}", raw.guest.first_name, raw.guest.last_name).trim().to_string(),
        guest_email: raw.guest.email,
        guest_phone: raw.guest.phone,
        check_in_date: raw.stay.check_in,
        check_out_date: raw.stay.check_out,
        adults: raw.stay.number_of_adults.max(1),
        children: raw.stay.number_of_children,
        infants: 0,
        nightly_rate: Decimal::ZERO,
        subtotal: total,
        fees: Decimal::ZERO,
        taxes: Decimal::ZERO,
        total,
        currency,
        status: map_status(&raw.status).to_string(),
        updated_at: crate::connector::parse_timestamp_or_now(raw.modified_time.as_deref()),
        raw_payload: serde_json::json!({
            "created_time": raw.created_time,
            "modified_time": raw.modified_time,
            "special_requests": raw.special_requests,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct PubSubEnvelope {
    message: PubSubMessage,
}

#[derive(Debug, Deserialize)]
struct PubSubMessage {
    #[serde(default)]
    data: serde_json::Value,
    #[serde(rename = "messageId", default)]
    message_id: String,
    #[serde(rename = "publishTime", default)]
    publish_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleWebhookData {
    #[serde(rename = "eventType", default)]
    event_type: String,
    #[serde(rename = "propertyId", default)]
    property_id: String,
}

#[async_trait]
impl ChannelAdapter for GoogleAdapter {
    fn channel_kind(&self) -> &'static str {
        channel_kind::GOOGLE
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
        let transaction = self.build_ari_transaction(
            remote_property_id,
            start_date,
            end_date,
            Some(available),
            min_stay,
            max_stay,
            None,
        );
        self.connector
            .execute_json::<serde_json::Value, _>(reqwest::Method::POST, &self.transactions_path(), Some(&transaction), None)
            .await?;
        Ok(())
    }

    async fn get_availability(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, bool>, ChannelAdapterError> {
        let path = format!("/accounts/{}/properties/{remote_property_id}/inventory", self.account_id);
        let query = [
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];

        match self
            .connector
            .execute_json::<InventoryResponse, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await
        {
            Ok(resp) => Ok(resp
                .inventory
                .into_iter()
                .map(|e| (e.date, e.availability > 0))
                .collect()),
            Err(_) => {
                tracing::warn!(channel = channel_kind::GOOGLE, property_id = remote_property_id, "availability query unsupported, returning empty");
                Ok(HashMap::new())
            }
        }
    }

    async fn update_pricing_bulk(
        &self,
        remote_property_id: &str,
        date_prices: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<(), ChannelAdapterError> {
        let mut dates: Vec<_> = date_prices.iter().collect();
        dates.sort_by_key(|(d, _)| **d);

        let rate_entries: Vec<_> = dates
            .into_iter()
            .map(|(date, price)| {
                serde_json::json!({
                    "date": date.to_string(),
                    "rate": { "amount": price.to_string(), "currency": currency },
                })
            })
            .collect();

        let transaction = serde_json::json!({
            "propertyId": remote_property_id,
            "roomType": "DEFAULT",
            "ratePlan": "DEFAULT",
            "rateUpdates": rate_entries,
        });

        self.connector
            .execute_json::<serde_json::Value, _>(reqwest::Method::POST, &self.transactions_path(), Some(&transaction), None)
            .await?;
        Ok(())
    }

    async fn get_pricing(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, Decimal>, ChannelAdapterError> {
        let path = format!("/accounts/{}/properties/{remote_property_id}/rates", self.account_id);
        let query = [
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ];

        match self
            .connector
            .execute_json::<RatesResponse, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await
        {
            Ok(resp) => Ok(resp
                .rates
                .into_iter()
                .map(|e| {
                    let amount = e.rate.map(|r| r.amount).unwrap_or(0.0);
                    (e.date, Decimal::try_from(amount).unwrap_or_default())
                })
                .collect()),
            Err(_) => {
                tracing::warn!(channel = channel_kind::GOOGLE, property_id = remote_property_id, "pricing query unsupported, returning empty");
                Ok(HashMap::new())
            }
        }
    }

    async fn get_bookings(
        &self,
        remote_property_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PlatformBooking>, ChannelAdapterError> {
        let path = format!("/accounts/{}/bookings", self.account_id);
        let mut query = vec![
            ("propertyId", remote_property_id.to_string()),
            ("pageSize", "100".to_string()),
        ];
        if let Some(since) = since {
            query.push(("modifiedAfter", format!("{}Z", since.to_rfc3339())));
        }

        match self
            .connector
            .execute_json::<BookingsResponse, ()>(reqwest::Method::GET, &path, None, Some(&query))
            .await
        {
            Ok(resp) => Ok(resp.bookings.into_iter().map(booking_into_platform).collect()),
            Err(e) => {
                tracing::warn!(channel = channel_kind::GOOGLE, error = %e, "could not retrieve bookings");
                Ok(Vec::new())
            }
        }
    }

    async fn get_booking(
        &self,
        _remote_property_id: &str,
        channel_booking_id: &str,
    ) -> Result<PlatformBooking, ChannelAdapterError> {
        let path = format!("/accounts/{}/bookings/{channel_booking_id}", self.account_id);
        let raw: GoogleBooking = self
            .connector
            .execute_json::<_, ()>(reqwest::Method::GET, &path, None, None)
            .await?;
        Ok(booking_into_platform(raw))
    }

    fn verify_webhook_signature(
        &self,
        _payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<bool, ChannelAdapterError> {
        let header = decode_header(signature).map_err(|e| ChannelAdapterError::InvalidSignature(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| ChannelAdapterError::InvalidSignature("JWT missing kid".to_string()))?;

        let cache = self.jwks_cache.read().expect("jwks cache lock poisoned");
        let Some(key) = cache.get(&kid) else {
            return Err(ChannelAdapterError::Configuration(
                "no cached signing key for kid, call refresh_jwks first".to_string(),
            ));
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[secret]);

        Ok(decode::<serde_json::Value>(signature, key, &validation).is_ok())
    }

    fn parse_webhook_event(&self, payload: serde_json::Value) -> Result<WebhookEvent, ChannelAdapterError> {
        let envelope: PubSubEnvelope = serde_json::from_value(payload.clone())
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let data_value = match &envelope.message.data {
            serde_json::Value::String(encoded) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;
                serde_json::from_slice(&decoded).map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?
            }
            other => other.clone(),
        };

        let parsed: GoogleWebhookData = serde_json::from_value(data_value.clone())
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let occurred_at = envelope
            .message
            .publish_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(WebhookEvent {
            channel_kind: channel_kind::GOOGLE.to_string(),
            event_type: map_event_type(&parsed.event_type).to_string(),
            event_id: envelope.message.message_id,
            remote_property_id: parsed.property_id,
            occurred_at,
            raw_payload: data_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ari_transaction_carries_one_entry_per_day() {
        let adapter = GoogleAdapter::new("token", "acct-1");
        let txn = adapter.build_ari_transaction(
            "prop-1",
            NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 13).unwrap(),
            Some(true),
            Some(2),
            None,
            Some((dec!(150), "EUR")),
        );
        assert_eq!(txn["inventoryUpdates"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn ari_xml_feed_contains_both_sections() {
        let adapter = GoogleAdapter::new("token", "acct-1");
        let mut availability = HashMap::new();
        availability.insert(NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(), true);
        let mut pricing = HashMap::new();
        pricing.insert(NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(), dec!(99));

        let xml = adapter.generate_ari_xml_feed("prop-1", &availability, &pricing, "EUR").unwrap();
        assert!(xml.contains("Inventory"));
        assert!(xml.contains("BaseRate"));
    }

    #[test]
    fn missing_kid_is_rejected() {
        let adapter = GoogleAdapter::new("token", "acct-1");
        let err = adapter.verify_webhook_signature(b"", "not-a-jwt", "aud").unwrap_err();
        assert!(matches!(err, ChannelAdapterError::InvalidSignature(_)));
    }

    #[test]
    fn completed_maps_to_checked_out() {
        assert_eq!(map_status("COMPLETED"), booking_status::CHECKED_OUT);
    }
}
