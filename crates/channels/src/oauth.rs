//! OAuth token refresh for platform channel connections.
//!
//! Four channels authenticate a stored refresh token against their own
//! token endpoint; Expedia authenticates the integration itself via
//! client-credentials. One generic refresher, keyed by a per-channel
//! [`OAuthEndpoint`], replaces five bespoke token dances.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use db::models::channel_kind;

/// Buffer before expiry at which the hourly refresh beat treats a token as
/// due for renewal.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("token refresh failed for {channel}: {message}")]
    RefreshFailed { channel: String, message: String },

    #[error("{0} request error: {1}")]
    Request(String, String),
}

/// Static per-channel OAuth configuration. `client_credentials_only` is set
/// for Expedia, whose Partner Central API authenticates the whole
/// integration rather than one property connection at a time.
#[derive(Debug, Clone)]
pub struct OAuthEndpoint {
    pub channel: &'static str,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub client_credentials_only: bool,
}

impl OAuthEndpoint {
    pub fn airbnb(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            channel: channel_kind::AIRBNB,
            token_url: "https://api.airbnb.com/v2/oauth2/token".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_credentials_only: false,
        }
    }

    pub fn booking_com(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            channel: channel_kind::BOOKING_COM,
            token_url: "https://distribution-xml.booking.com/oauth2/token".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_credentials_only: false,
        }
    }

    pub fn expedia(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            channel: channel_kind::EXPEDIA,
            token_url: "https://services.expediapartnercentral.com/authentication/1/token".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_credentials_only: true,
        }
    }

    pub fn fewo_direkt(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            channel: channel_kind::FEWO_DIREKT,
            token_url: "https://api.vrbo.com/oauth2/token".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_credentials_only: false,
        }
    }

    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            channel: channel_kind::GOOGLE,
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client_credentials_only: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct TokenRefresher {
    http: reqwest::Client,
}

impl Default for TokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenRefresher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// True once `expires_at` falls within `buffer_secs` of now, or is
    /// absent (a connection onboarded without an expiry is assumed to need
    /// a check on the next beat rather than being trusted indefinitely).
    pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, buffer_secs: i64) -> bool {
        match expires_at {
            Some(expires_at) => Utc::now() + Duration::seconds(buffer_secs) >= expires_at,
            None => true,
        }
    }

    pub async fn refresh(&self, endpoint: &OAuthEndpoint, refresh_token: &str) -> Result<RefreshedTokens, OAuthError> {
        if endpoint.client_credentials_only {
            return self.client_credentials(endpoint).await;
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", endpoint.client_id.as_str()),
            ("client_secret", endpoint.client_secret.as_str()),
        ];
        self.request_token(endpoint, &form).await
    }

    pub async fn client_credentials(&self, endpoint: &OAuthEndpoint) -> Result<RefreshedTokens, OAuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", endpoint.client_id.as_str()),
            ("client_secret", endpoint.client_secret.as_str()),
        ];
        self.request_token(endpoint, &form).await
    }

    async fn request_token(
        &self,
        endpoint: &OAuthEndpoint,
        form: &[(&str, &str)],
    ) -> Result<RefreshedTokens, OAuthError> {
        let response = self
            .http
            .post(&endpoint.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| OAuthError::Request(endpoint.channel.to_string(), e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::RefreshFailed {
                channel: endpoint.channel.to_string(),
                message: body,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Request(endpoint.channel.to_string(), e.to_string()))?;

        let expires_at = parsed.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));

        Ok(RefreshedTokens {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expiry_is_treated_as_due() {
        assert!(TokenRefresher::needs_refresh(None, DEFAULT_REFRESH_BUFFER_SECS));
    }

    #[test]
    fn far_future_expiry_does_not_need_refresh() {
        let expires_at = Utc::now() + Duration::hours(6);
        assert!(!TokenRefresher::needs_refresh(Some(expires_at), DEFAULT_REFRESH_BUFFER_SECS));
    }

    #[test]
    fn expiry_inside_the_buffer_needs_refresh() {
        let expires_at = Utc::now() + Duration::seconds(60);
        assert!(TokenRefresher::needs_refresh(Some(expires_at), DEFAULT_REFRESH_BUFFER_SECS));
    }

    #[test]
    fn expedia_endpoint_is_client_credentials_only() {
        let endpoint = OAuthEndpoint::expedia("id", "secret");
        assert!(endpoint.client_credentials_only);
    }
}
