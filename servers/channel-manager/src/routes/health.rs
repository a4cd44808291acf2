//! Liveness/readiness endpoint: database and Redis connectivity, each
//! timed, rolled up into one overall status the way the booking API's
//! dependents expect before routing traffic here.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use redis::AsyncCommands;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub service: String,
    pub dependencies: Vec<DependencyHealth>,
    pub timestamp: String,
}

async fn check_database(pool: &db::DbPool) -> DependencyHealth {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(_) => DependencyHealth {
            name: "database".to_string(),
            status: if latency_ms > 1000 { HealthStatus::Degraded } else { HealthStatus::Healthy },
            latency_ms: Some(latency_ms),
            error: None,
        },
        Err(e) => DependencyHealth {
            name: "database".to_string(),
            status: HealthStatus::Unhealthy,
            latency_ms: Some(latency_ms),
            error: Some(e.to_string()),
        },
    }
}

async fn check_redis(state: &AppState) -> DependencyHealth {
    let start = Instant::now();
    let mut conn = state.reservations.events.clone();
    let result: redis::RedisResult<String> = conn.ping().await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(_) => DependencyHealth {
            name: "redis".to_string(),
            status: if latency_ms > 1000 { HealthStatus::Degraded } else { HealthStatus::Healthy },
            latency_ms: Some(latency_ms),
            error: None,
        },
        Err(e) => DependencyHealth {
            name: "redis".to_string(),
            status: HealthStatus::Unhealthy,
            latency_ms: Some(latency_ms),
            error: Some(e.to_string()),
        },
    }
}

fn overall(dependencies: &[DependencyHealth]) -> HealthStatus {
    if dependencies.iter().any(|d| d.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if dependencies.iter().any(|d| d.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/webhooks/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let dependencies = vec![check_database(&state.db).await, check_redis(&state).await];
    let status = overall(&dependencies);
    let status_code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            service: "channel-manager".to_string(),
            dependencies,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}
