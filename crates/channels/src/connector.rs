//! HTTP execution chokepoint every adapter routes its JSON and XML calls
//! through. Centralizes the status-code-to-error mapping so each adapter's
//! `_map_*` logic only has to worry about the happy path.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ChannelAdapterError;

/// Parses a vendor-supplied RFC3339 timestamp, falling back to the current
/// time when the field is absent or the vendor sent something unparseable.
/// Every adapter's booking payload uses this for the "updated at" value
/// that feeds the sync engine's idempotency key.
pub fn parse_timestamp_or_now(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Thin wrapper around a [`reqwest::Client`] bound to one channel's base
/// URL and bearer token.
#[derive(Clone)]
pub struct HttpConnector {
    channel: String,
    base_url: String,
    access_token: String,
    client: Client,
}

impl HttpConnector {
    pub fn new(channel: impl Into<String>, base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");

        Self {
            channel: channel.into(),
            base_url: base_url.into(),
            access_token: access_token.into(),
            client,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    /// Issue a JSON request and deserialize the body, mapping every
    /// non-2xx response onto [`ChannelAdapterError`].
    pub async fn execute_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: Option<&[(&str, String)]>,
    ) -> Result<T, ChannelAdapterError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let mut request = self.authed(self.client.request(method, self.url(path)));
        if let Some(q) = query {
            request = request.query(q);
        }
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request.send().await.map_err(|e| self.network_error(e))?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if text.trim().is_empty() {
                return serde_json::from_str("null")
                    .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()));
            }
            return serde_json::from_str(&text)
                .map_err(|e| ChannelAdapterError::MalformedResponse(e.to_string()));
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(self.status_to_error(status, retry_after, body_text))
    }

    /// Issue a raw POST carrying an XML body, returning the response text
    /// unparsed (Booking.com OTA, Google ARI feeds). Status handling is the
    /// same chokepoint as `execute_json`.
    pub async fn execute_xml(&self, path: &str, xml_body: String) -> Result<String, ChannelAdapterError> {
        let request = self
            .authed(self.client.post(self.url(path)))
            .header("Content-Type", "application/xml")
            .body(xml_body);

        let response = request.send().await.map_err(|e| self.network_error(e))?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(text)
        } else {
            Err(self.status_to_error(status, retry_after, text))
        }
    }

    fn network_error(&self, err: reqwest::Error) -> ChannelAdapterError {
        ChannelAdapterError::Transient {
            channel: self.channel.clone(),
            message: err.to_string(),
        }
    }

    fn status_to_error(
        &self,
        status: StatusCode,
        retry_after_secs: Option<u64>,
        body: String,
    ) -> ChannelAdapterError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChannelAdapterError::Authentication {
                channel: self.channel.clone(),
                message: body,
            },
            StatusCode::NOT_FOUND => ChannelAdapterError::NotFound {
                channel: self.channel.clone(),
                resource: body,
            },
            StatusCode::TOO_MANY_REQUESTS => ChannelAdapterError::RateLimited {
                channel: self.channel.clone(),
                retry_after_secs,
            },
            StatusCode::BAD_REQUEST => ChannelAdapterError::Validation {
                channel: self.channel.clone(),
                message: body,
            },
            s if s.is_server_error() => ChannelAdapterError::Transient {
                channel: self.channel.clone(),
                message: format!("{s}: {body}"),
            },
            s => ChannelAdapterError::Transient {
                channel: self.channel.clone(),
                message: format!("unexpected status {s}: {body}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        let connector = HttpConnector::new("airbnb", "https://api.airbnb.com/v2", "tok");
        let err = connector.status_to_error(StatusCode::TOO_MANY_REQUESTS, Some(42), String::new());
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_secs(), Some(42));
    }

    #[test]
    fn server_error_is_transient() {
        let connector = HttpConnector::new("expedia", "https://services.expediapartnercentral.com", "tok");
        let err = connector.status_to_error(StatusCode::BAD_GATEWAY, None, "down".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        let connector = HttpConnector::new("google", "https://travelpartner.googleapis.com/v3", "tok");
        let err = connector.status_to_error(StatusCode::NOT_FOUND, None, String::new());
        assert!(!err.is_retryable());
    }
}
