//! Booking.com platform adapter.
//!
//! Availability and rates travel over the legacy OTA XML API; reservations
//! come back through a separate REST/JSON endpoint. Two base URLs, one
//! adapter.

use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use db::models::channel_kind;
use db::models::{booking_status, event_type, PlatformBooking, WebhookEvent};

use crate::adapter::ChannelAdapter;
use crate::connector::HttpConnector;
use crate::error::ChannelAdapterError;

const XML_BASE_URL: &str = "https://distribution-xml.booking.com/2.0";
const REST_BASE_URL: &str = "https://partner.booking.com/json";
const OTA_NS: &str = "http://www.opentravel.org/OTA/2003/05";
const PAGE_SIZE: u32 = 100;

pub struct BookingComAdapter {
    xml_connector: HttpConnector,
    rest_connector: HttpConnector,
}

impl BookingComAdapter {
    pub fn new(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        Self {
            xml_connector: HttpConnector::new(channel_kind::BOOKING_COM, XML_BASE_URL, access_token.clone()),
            rest_connector: HttpConnector::new(channel_kind::BOOKING_COM, REST_BASE_URL, access_token),
        }
    }

    fn build_avail_notif_xml(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        available: bool,
        min_stay: Option<i32>,
        max_stay: Option<i32>,
    ) -> Result<String, ChannelAdapterError> {
        let mut buf = Vec::new();
        let mut writer = Writer::new(Cursor::new(&mut buf));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_write_err)?;

        let mut root = BytesStart::new("OTA_HotelAvailNotifRQ");
        root.push_attribute(("xmlns", OTA_NS));
        root.push_attribute(("Version", "1.0"));
        let timestamp = Utc::now().to_rfc3339();
        root.push_attribute(("TimeStamp", timestamp.as_str()));
        writer.write_event(Event::Start(root)).map_err(xml_write_err)?;

        let mut messages = BytesStart::new("AvailStatusMessages");
        messages.push_attribute(("HotelCode", remote_property_id));
        writer.write_event(Event::Start(messages)).map_err(xml_write_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("AvailStatusMessage")))
            .map_err(xml_write_err)?;

        let mut control = BytesStart::new("StatusApplicationControl");
        let start_str = start_date.to_string();
        let end_str = end_date.to_string();
        control.push_attribute(("Start", start_str.as_str()));
        control.push_attribute(("End", end_str.as_str()));
        control.push_attribute(("InvTypeCode", "ROOM"));
        control.push_attribute(("RatePlanCode", "DEFAULT"));
        writer.write_event(Event::Empty(control)).map_err(xml_write_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("LengthsOfStay")))
            .map_err(xml_write_err)?;
        let mut min_los = BytesStart::new("LengthOfStay");
        let min_stay_str = min_stay.unwrap_or(1).to_string();
        min_los.push_attribute(("MinMaxMessageType", "MinLOS"));
        min_los.push_attribute(("Time", min_stay_str.as_str()));
        writer.write_event(Event::Empty(min_los)).map_err(xml_write_err)?;
        if let Some(max_stay) = max_stay {
            let mut max_los = BytesStart::new("LengthOfStay");
            let max_stay_str = max_stay.to_string();
            max_los.push_attribute(("MinMaxMessageType", "MaxLOS"));
            max_los.push_attribute(("Time", max_stay_str.as_str()));
            writer.write_event(Event::Empty(max_los)).map_err(xml_write_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("LengthsOfStay")))
            .map_err(xml_write_err)?;

        writer
            .write_event(Event::Start(BytesStart::new("BookingLimit")))
            .map_err(xml_write_err)?;
        let limit_text = if available { "1" } else { "0" };
        writer
            .write_event(Event::Text(BytesText::new(limit_text)))
            .map_err(xml_write_err)?;
        writer.write_event(Event::End(BytesEnd::new("BookingLimit"))).map_err(xml_write_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("AvailStatusMessage")))
            .map_err(xml_write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("AvailStatusMessages")))
            .map_err(xml_write_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("OTA_HotelAvailNotifRQ")))
            .map_err(xml_write_err)?;

        String::from_utf8(buf).map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))
    }

    fn build_rate_plan_notif_xml(
        &self,
        remote_property_id: &str,
        date_prices: &HashMap<NaiveDate, Decimal>,
        currency: &str,
    ) -> Result<String, ChannelAdapterError> {
        let mut buf = Vec::new();
        let mut writer = Writer::new(Cursor::new(&mut buf));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_write_err)?;

        let mut root = BytesStart::new("OTA_HotelRatePlanNotifRQ");
        root.push_attribute(("xmlns", OTA_NS));
        root.push_attribute(("Version", "1.0"));
        let timestamp = Utc::now().to_rfc3339();
        root.push_attribute(("TimeStamp", timestamp.as_str()));
        writer.write_event(Event::Start(root)).map_err(xml_write_err)?;

        let mut dates: Vec<_> = date_prices.iter().collect();
        dates.sort_by_key(|(d, _)| **d);

        for (date, price) in dates {
            let mut rate_plans = BytesStart::new("RatePlans");
            rate_plans.push_attribute(("HotelCode", remote_property_id));
            writer.write_event(Event::Start(rate_plans)).map_err(xml_write_err)?;

            let mut rate_plan = BytesStart::new("RatePlan");
            rate_plan.push_attribute(("RatePlanCode", "DEFAULT"));
            writer.write_event(Event::Start(rate_plan)).map_err(xml_write_err)?;
            writer.write_event(Event::Start(BytesStart::new("Rates"))).map_err(xml_write_err)?;

            let mut rate = BytesStart::new("Rate");
            let date_str = date.to_string();
            rate.push_attribute(("Start", date_str.as_str()));
            rate.push_attribute(("End", date_str.as_str()));
            writer.write_event(Event::Start(rate)).map_err(xml_write_err)?;
            writer
                .write_event(Event::Start(BytesStart::new("BaseByGuestAmts")))
                .map_err(xml_write_err)?;

            let mut amt = BytesStart::new("BaseByGuestAmt");
            let price_str = price.to_string();
            amt.push_attribute(("AmountAfterTax", price_str.as_str()));
            amt.push_attribute(("CurrencyCode", currency));
            amt.push_attribute(("NumberOfGuests", "2"));
            writer.write_event(Event::Empty(amt)).map_err(xml_write_err)?;

            writer.write_event(Event::End(BytesEnd::new("BaseByGuestAmts"))).map_err(xml_write_err)?;
            writer.write_event(Event::End(BytesEnd::new("Rate"))).map_err(xml_write_err)?;
            writer.write_event(Event::End(BytesEnd::new("Rates"))).map_err(xml_write_err)?;
            writer.write_event(Event::End(BytesEnd::new("RatePlan"))).map_err(xml_write_err)?;
            writer.write_event(Event::End(BytesEnd::new("RatePlans"))).map_err(xml_write_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("OTA_HotelRatePlanNotifRQ")))
            .map_err(xml_write_err)?;

        String::from_utf8(buf).map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))
    }

    fn validate_ota_response(&self, xml_text: &str) -> Result<(), ChannelAdapterError> {
        let parsed: OtaEnvelope = quick_xml::de::from_str(xml_text)
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        if let Some(errors) = parsed.errors {
            if !errors.error.is_empty() {
                let messages: Vec<String> = errors
                    .error
                    .iter()
                    .map(|e| e.short_text.clone().unwrap_or_else(|| "unknown error".to_string()))
                    .collect();
                return Err(ChannelAdapterError::Validation {
                    channel: channel_kind::BOOKING_COM.to_string(),
                    message: messages.join(", "),
                });
            }
        }
        for warning in parsed.warnings.map(|w| w.warning).unwrap_or_default() {
            tracing::warn!(channel = channel_kind::BOOKING_COM, warning = ?warning.short_text, "OTA warning");
        }
        Ok(())
    }
}

fn xml_write_err(e: quick_xml::Error) -> ChannelAdapterError {
    ChannelAdapterError::MalformedResponse(e.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct OtaEnvelope {
    #[serde(rename = "Errors", default)]
    errors: Option<OtaErrors>,
    #[serde(rename = "Warnings", default)]
    warnings: Option<OtaWarnings>,
    #[serde(rename = "AvailStatusMessages", default)]
    avail_status_messages: Option<AvailStatusMessagesWrap>,
    #[serde(rename = "RatePlans", default)]
    rate_plans: Option<RatePlansWrap>,
}

#[derive(Debug, Default, Deserialize)]
struct OtaErrors {
    #[serde(rename = "Error", default)]
    error: Vec<OtaMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct OtaWarnings {
    #[serde(rename = "Warning", default)]
    warning: Vec<OtaMessage>,
}

#[derive(Debug, Deserialize)]
struct OtaMessage {
    #[serde(rename = "@ShortText", default)]
    short_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AvailStatusMessagesWrap {
    #[serde(rename = "AvailStatusMessage", default)]
    message: Vec<AvailStatusMessage>,
}

#[derive(Debug, Deserialize)]
struct AvailStatusMessage {
    #[serde(rename = "StatusApplicationControl")]
    control: StatusApplicationControl,
    #[serde(rename = "BookingLimit", default)]
    booking_limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StatusApplicationControl {
    #[serde(rename = "@Start")]
    start: NaiveDate,
    #[serde(rename = "@End")]
    end: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
struct RatePlansWrap {
    #[serde(rename = "RatePlan", default)]
    rate_plan: Vec<RatePlanEntry>,
}

#[derive(Debug, Deserialize)]
struct RatePlanEntry {
    #[serde(rename = "Rates", default)]
    rates: Option<RatesWrap>,
}

#[derive(Debug, Default, Deserialize)]
struct RatesWrap {
    #[serde(rename = "Rate", default)]
    rate: Vec<RateEntry>,
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    #[serde(rename = "@Start")]
    start: NaiveDate,
    #[serde(rename = "@End")]
    end: NaiveDate,
    #[serde(rename = "BaseByGuestAmts")]
    base_by_guest_amts: BaseByGuestAmts,
}

#[derive(Debug, Deserialize)]
struct BaseByGuestAmts {
    #[serde(rename = "BaseByGuestAmt")]
    base_by_guest_amt: BaseByGuestAmt,
}

#[derive(Debug, Deserialize)]
struct BaseByGuestAmt {
    #[serde(rename = "@AmountAfterTax")]
    amount_after_tax: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReservationsResponse {
    #[serde(default)]
    reservations: Vec<BookingComReservation>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SingleReservationResponse {
    reservation: BookingComReservation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookingComReservation {
    reservation_id: String,
    hotel_id: serde_json::Value,
    #[serde(default)]
    status: String,
    arrival_date: NaiveDate,
    departure_date: NaiveDate,
    #[serde(default)]
    guest: BookingComGuest,
    #[serde(default)]
    room: BookingComRoom,
    #[serde(default)]
    total_price: f64,
    #[serde(default = "default_currency")]
    currency_code: String,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default)]
    booked_at: Option<String>,
    #[serde(default)]
    modified_at: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BookingComGuest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    telephone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BookingComRoom {
    #[serde(default)]
    adults: i32,
    #[serde(default)]
    children: i32,
}

fn map_status(status: &str) -> &'static str {
    match status.to_lowercase().as_str() {
        "modified" | "ok" => booking_status::CONFIRMED,
        "cancelled" => booking_status::CANCELLED,
        "no_show" => booking_status::NO_SHOW,
        _ => booking_status::RESERVED,
    }
}

fn map_event_type(status: &str) -> &'static str {
    match status.to_lowercase().as_str() {
        "new" => event_type::BOOKING_CREATED,
        "modified" => event_type::BOOKING_UPDATED,
        "cancelled" => event_type::BOOKING_CANCELLED,
        "no_show" => event_type::BOOKING_NO_SHOW,
        _ => event_type::BOOKING_UPDATED,
    }
}

fn reservation_into_booking(res: BookingComReservation) -> PlatformBooking {
    let total = Decimal::try_from(res.total_price).unwrap_or_default();
    PlatformBooking {
        channel_kind: channel_kind::BOOKING_COM.to_string(),
        channel_booking_id: res.reservation_id,
        remote_property_id: res.hotel_id.as_str().map(str::to_string).unwrap_or_else(|| res.hotel_id.to_string()),
        guest_name: format!("{} {}", res.guest.first_name, res.guest.last_name).trim().to_string(),
        guest_email: res.guest.email,
        guest_phone: res.guest.telephone,
        check_in_date: res.arrival_date,
        check_out_date: res.departure_date,
        adults: res.room.adults.max(1),
        children: res.room.children,
        infants: 0,
        nightly_rate: Decimal::ZERO,
        subtotal: total,
        fees: Decimal::ZERO,
        taxes: Decimal::ZERO,
        total,
        currency: res.currency_code,
        status: map_status(&res.status).to_string(),
        updated_at: crate::connector::parse_timestamp_or_now(res.modified_at.as_deref()),
        raw_payload: serde_json::json!({
            "booked_at": res.booked_at,
            "modified_at": res.modified_at,
            "remarks": res.remarks,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct BookingComWebhookPayload {
    #[serde(default)]
    reservation_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    hotel_id: String,
}

#[async_trait]
impl ChannelAdapter for BookingComAdapter {
    fn channel_kind(&self) -> &'static str {
        channel_kind::BOOKING_COM
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
        let xml = self.build_avail_notif_xml(remote_property_id, start_date, end_date, available, min_stay, max_stay)?;
        let response = self.xml_connector.execute_xml("/availability", xml).await?;
        self.validate_ota_response(&response)
    }

    async fn get_availability(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, bool>, ChannelAdapterError> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OTA_HotelAvailRQ xmlns="{OTA_NS}" Version="1.0" TimeStamp="{}">
  <AvailRequestSegments>
    <AvailRequestSegment>
      <HotelSearchCriteria><Criterion><HotelRef HotelCode="{remote_property_id}"/></Criterion></HotelSearchCriteria>
      <StayDateRange Start="{start_date}" End="{end_date}"/>
    </AvailRequestSegment>
  </AvailRequestSegments>
</OTA_HotelAvailRQ>"#,
            Utc::now().to_rfc3339()
        );
        let response = self.xml_connector.execute_xml("/availability/get", xml).await?;
        let parsed: OtaEnvelope = quick_xml::de::from_str(&response)
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let mut availability = HashMap::new();
        for msg in parsed.avail_status_messages.map(|w| w.message).unwrap_or_default() {
            let is_available = msg.booking_limit.unwrap_or(1) > 0;
            let mut current = msg.control.start;
            while current <= msg.control.end {
                availability.insert(current, is_available);
                current += chrono::Duration::days(1);
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
        let xml = self.build_rate_plan_notif_xml(remote_property_id, date_prices, currency)?;
        let response = self.xml_connector.execute_xml("/rates", xml).await?;
        self.validate_ota_response(&response)
    }

    async fn get_pricing(
        &self,
        remote_property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<NaiveDate, Decimal>, ChannelAdapterError> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OTA_HotelRatePlanRQ xmlns="{OTA_NS}" Version="1.0" TimeStamp="{}">
  <RatePlans><RatePlan HotelCode="{remote_property_id}"><DateRange Start="{start_date}" End="{end_date}"/></RatePlan></RatePlans>
</OTA_HotelRatePlanRQ>"#,
            Utc::now().to_rfc3339()
        );
        let response = self.xml_connector.execute_xml("/rates/get", xml).await?;
        let parsed: OtaEnvelope = quick_xml::de::from_str(&response)
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        let mut pricing = HashMap::new();
        for plan in parsed.rate_plans.map(|w| w.rate_plan).unwrap_or_default() {
            for rate in plan.rates.map(|r| r.rate).unwrap_or_default() {
                let amount = rate.base_by_guest_amts.base_by_guest_amt.amount_after_tax;
                let mut current = rate.start;
                while current <= rate.end {
                    pricing.insert(current, amount);
                    current += chrono::Duration::days(1);
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
        let mut page = 0u32;

        loop {
            let mut query = vec![
                ("hotel_id", remote_property_id.to_string()),
                ("rows", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(since) = since {
                query.push(("changed_since", since.format("%Y-%m-%d %H:%M:%S").to_string()));
            }

            let resp: ReservationsResponse = self
                .rest_connector
                .execute_json::<_, ()>(reqwest::Method::GET, "/reservations", None, Some(&query))
                .await?;

            let count = resp.reservations.len();
            all.extend(resp.reservations.into_iter().map(reservation_into_booking));

            if count < PAGE_SIZE as usize {
                break;
            }
            page += 1;
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
            .rest_connector
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
        let parsed: BookingComWebhookPayload = serde_json::from_value(payload.clone())
            .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()))?;

        Ok(WebhookEvent {
            channel_kind: channel_kind::BOOKING_COM.to_string(),
            event_type: map_event_type(&parsed.status).to_string(),
            event_id: parsed.reservation_id,
            remote_property_id: parsed.hotel_id,
            occurred_at: Utc::now(),
            raw_payload: payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn avail_notif_xml_carries_the_booking_limit() {
        let adapter = BookingComAdapter::new("token");
        let xml = adapter
            .build_avail_notif_xml(
                "123",
                NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
                NaiveDate::from_ymd_opt(2026, 8, 12).unwrap(),
                true,
                Some(2),
                None,
            )
            .unwrap();
        assert!(xml.contains("HotelCode=\"123\""));
        assert!(xml.contains("MinLOS"));
    }

    #[test]
    fn rate_plan_xml_includes_every_date() {
        let adapter = BookingComAdapter::new("token");
        let mut prices = HashMap::new();
        prices.insert(NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(), dec!(120));
        prices.insert(NaiveDate::from_ymd_opt(2026, 8, 11).unwrap(), dec!(130));
        let xml = adapter.build_rate_plan_notif_xml("123", &prices, "EUR").unwrap();
        assert!(xml.contains("120"));
        assert!(xml.contains("130"));
    }

    #[test]
    fn status_map_recognizes_no_show() {
        assert_eq!(map_status("no_show"), booking_status::NO_SHOW);
    }
}
