//! Application state shared across all handlers: the sync engine's context,
//! the direct-booking reservation context, and the per-channel webhook
//! secrets neither one owns.

use std::collections::HashMap;
use std::sync::Arc;

use db::models::channel_kind;
use db::DbPool;
use reservations::ReservationContext;
use sync_engine::SyncContext;

/// Static webhook-verification secrets, one per platform plus Stripe.
/// Loaded once at startup from `<CHANNEL>_WEBHOOK_SECRET` / `STRIPE_WEBHOOK_SECRET`
/// environment variables — channel connections authenticate the stored
/// OAuth token against the platform's API, but the inbound webhook secret
/// is provisioned once per integration, not per property connection.
pub struct WebhookSecrets {
    secrets: HashMap<&'static str, String>,
    pub stripe: String,
    pub google_bearer_token: String,
}

impl WebhookSecrets {
    pub fn from_env() -> Self {
        let mut secrets = HashMap::new();
        for kind in channel_kind::ALL {
            let var = format!("{}_WEBHOOK_SECRET", kind.to_uppercase());
            secrets.insert(kind, std::env::var(&var).unwrap_or_default());
        }
        Self {
            secrets,
            stripe: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            google_bearer_token: std::env::var("GOOGLE_WEBHOOK_BEARER_TOKEN").unwrap_or_default(),
        }
    }

    pub fn for_channel(&self, channel_kind: &str) -> Option<&str> {
        self.secrets.get(channel_kind).map(String::as_str)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub sync: SyncContext,
    pub reservations: ReservationContext,
    pub webhook_secrets: Arc<WebhookSecrets>,
}
