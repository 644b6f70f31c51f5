use axum::extract::State;
use axum::{http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database_connected: bool,
    pub storage_connected: bool,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_connected = match state.documents.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "metadata store health check failed");
            false
        }
    };
    let storage_connected = match state.artifacts.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "object storage health check failed");
            false
        }
    };

    let healthy = database_connected && storage_connected;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
            database_connected,
            storage_connected,
        }),
    )
}
