//! Hourly sweep refreshing OAuth tokens that are near expiry.

use channels::crypto::{decrypt_if_available, encrypt_if_available};
use channels::oauth::{OAuthEndpoint, TokenRefresher};
use db::models::channel_connection::ChannelConnection;
use db::models::channel_kind;

use crate::context::SyncContext;

const REFRESH_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

pub async fn refresh_expiring_tokens(ctx: &SyncContext) {
    let connections = match ctx.connections.list_expiring_within(REFRESH_WINDOW_SECS).await {
        Ok(connections) => connections,
        Err(e) => {
            tracing::error!(error = %e, "could not list connections due for token refresh");
            return;
        }
    };

    let refresher = TokenRefresher::new();
    for connection in connections {
        if let Err(e) = refresh_one(ctx, &refresher, &connection).await {
            tracing::warn!(connection_id = %connection.id, channel = %connection.channel_kind, error = %e, "token refresh failed");
        }
    }
}

/// Out-of-band trigger for a single connection, called the moment an
/// outbound write observes `ChannelAdapterError::Authentication` rather
/// than waiting for the hourly sweep to reach it.
pub(crate) async fn refresh_connection_now(ctx: &SyncContext, connection: &ChannelConnection) {
    let refresher = TokenRefresher::new();
    if let Err(e) = refresh_one(ctx, &refresher, connection).await {
        tracing::warn!(connection_id = %connection.id, channel = %connection.channel_kind, error = %e, "on-demand token refresh after auth failure did not succeed");
    }
}

fn endpoint_for(channel_kind: &str) -> Option<OAuthEndpoint> {
    match channel_kind {
        channel_kind::AIRBNB => Some(OAuthEndpoint::airbnb()),
        channel_kind::BOOKING_COM => Some(OAuthEndpoint::booking_com()),
        channel_kind::EXPEDIA => Some(OAuthEndpoint::expedia()),
        channel_kind::FEWO_DIREKT => Some(OAuthEndpoint::fewo_direkt()),
        channel_kind::GOOGLE => Some(OAuthEndpoint::google()),
        _ => None,
    }
}

async fn refresh_one(
    ctx: &SyncContext,
    refresher: &TokenRefresher,
    connection: &ChannelConnection,
) -> Result<(), channels::OAuthError> {
    let Some(endpoint) = endpoint_for(&connection.channel_kind) else {
        return Ok(());
    };

    let refresh_token = connection
        .refresh_token_encrypted
        .as_deref()
        .map(|encrypted| decrypt_if_available(Some(&ctx.crypto), encrypted));

    let result = if endpoint.client_credentials_only {
        refresher.client_credentials(&endpoint).await
    } else {
        let Some(refresh_token) = refresh_token else {
            return Ok(());
        };
        refresher.refresh(&endpoint, &refresh_token).await
    };

    match result {
        Ok(refreshed) => {
            let access_encrypted = encrypt_if_available(Some(&ctx.crypto), &refreshed.access_token);
            let refresh_encrypted = refreshed
                .refresh_token
                .as_deref()
                .map(|t| encrypt_if_available(Some(&ctx.crypto), t));

            ctx.connections
                .update_tokens(
                    connection.id,
                    &access_encrypted,
                    refresh_encrypted.as_deref(),
                    refreshed.expires_at,
                )
                .await
                .map_err(|e| channels::OAuthError::Request(connection.channel_kind.clone(), e.to_string()))?;
            Ok(())
        }
        Err(e) => {
            let updated = ctx
                .connections
                .record_auth_failure(connection.id)
                .await
                .map_err(|e| channels::OAuthError::Request(connection.channel_kind.clone(), e.to_string()))?;
            if updated.status == db::models::channel_connection::connection_status::EXPIRED {
                tracing::warn!(connection_id = %connection.id, "connection marked expired after repeated auth failures");
            }
            Err(e)
        }
    }
}
