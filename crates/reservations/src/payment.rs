//! Payment processor abstraction and a Stripe-shaped implementation.
//! Mirrors how the channel adapters wrap one vendor's HTTP API behind a
//! shared trait: the reservation flow never branches on which processor
//! is configured.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use crate::error::PaymentError;

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub client_secret: Option<String>,
    /// Amount Stripe actually recorded against the intent, major units.
    /// `None` for a freshly created intent that hasn't captured funds yet.
    pub amount_received: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct Refund {
    pub id: String,
    pub status: String,
}

/// Stripe's own vocabulary for `payment_intent.status` that a succeeded
/// confirmation must observe at the processor, not just at the request.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "succeeded";

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        booking_reference: &str,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Fetches the processor's current view of the intent. `confirm_booking`
    /// uses this to verify a payment actually succeeded rather than trusting
    /// whatever the caller claims.
    async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Best-effort cancel for an intent nothing will ever capture — a
    /// calendar claim that lost the race, or a reservation that expired
    /// unconfirmed. Cancelling an already-succeeded or already-cancelled
    /// intent is a Stripe no-op, not an error, so callers can call this
    /// unconditionally on their failure paths.
    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> Result<(), PaymentError>;

    async fn refund(&self, payment_intent_id: &str, amount: Decimal) -> Result<Refund, PaymentError>;
}

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

pub struct StripePaymentProcessor {
    client: reqwest::Client,
    secret_key: String,
}

impl StripePaymentProcessor {
    pub fn new(secret_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            secret_key: secret_key.into(),
        }
    }

    pub fn from_env() -> Result<Self, PaymentError> {
        let key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Request("STRIPE_SECRET_KEY not set".to_string()))?;
        Ok(Self::new(key))
    }

    /// Stripe expects the smallest currency unit (cents for USD/EUR).
    fn to_minor_units(amount: Decimal) -> i64 {
        (amount * Decimal::from(100)).round().try_into().unwrap_or(0)
    }

    /// Stripe returns minor units; `amount_received` is `0` until capture.
    fn to_major_units(minor: i64) -> Decimal {
        Decimal::from(minor) / Decimal::from(100)
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntentResponse {
    id: String,
    status: String,
    client_secret: Option<String>,
    #[serde(default)]
    amount_received: i64,
}

#[derive(Debug, Deserialize)]
struct StripeRefundResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        booking_reference: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let params = [
            ("amount", Self::to_minor_units(amount).to_string()),
            ("currency", currency.to_lowercase()),
            ("metadata[booking_reference]", booking_reference.to_string()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents"))
            .basic_auth(&self.secret_key, Some(""))
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        handle_response::<StripePaymentIntentResponse>(response)
            .await
            .map(|body| PaymentIntent {
                id: body.id,
                status: body.status,
                client_secret: body.client_secret,
                amount_received: Some(Self::to_major_units(body.amount_received)),
            })
    }

    async fn retrieve_payment_intent(&self, payment_intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let response = self
            .client
            .get(format!("{STRIPE_API_BASE}/payment_intents/{payment_intent_id}"))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        handle_response::<StripePaymentIntentResponse>(response)
            .await
            .map(|body| PaymentIntent {
                id: body.id,
                status: body.status,
                client_secret: body.client_secret,
                amount_received: Some(Self::to_major_units(body.amount_received)),
            })
    }

    async fn cancel_payment_intent(&self, payment_intent_id: &str) -> Result<(), PaymentError> {
        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/payment_intents/{payment_intent_id}/cancel"))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::BAD_REQUEST {
            // Stripe answers 400 `payment_intent_unexpected_state` for an
            // intent that's already succeeded or already canceled; either
            // way there is nothing left for us to cancel.
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(PaymentError::Request(format!("stripe returned {status}: {text}")))
    }

    async fn refund(&self, payment_intent_id: &str, amount: Decimal) -> Result<Refund, PaymentError> {
        let params = [
            ("payment_intent", payment_intent_id.to_string()),
            ("amount", Self::to_minor_units(amount).to_string()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}/refunds"))
            .basic_auth(&self.secret_key, Some(""))
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        handle_response::<StripeRefundResponse>(response)
            .await
            .map(|body| Refund {
                id: body.id,
                status: body.status,
            })
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, PaymentError> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if status.is_success() {
        return serde_json::from_str(&text).map_err(|e| PaymentError::MalformedResponse(e.to_string()));
    }

    match serde_json::from_str::<StripeErrorEnvelope>(&text) {
        Ok(envelope) if envelope.error.code.as_deref() == Some("card_declined") => {
            Err(PaymentError::Declined(envelope.error.message))
        }
        Ok(envelope) => Err(PaymentError::Request(envelope.error.message)),
        Err(_) => Err(PaymentError::Request(format!("stripe returned {status}: {text}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_to_minor_currency_units() {
        assert_eq!(StripePaymentProcessor::to_minor_units(dec!(12.34)), 1234);
        assert_eq!(StripePaymentProcessor::to_minor_units(dec!(100)), 10000);
    }
}
