use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    backend: &'static str,
    timestamp: String,
    uptime: u64,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let store = state.store();
    let connected = match store.ping().await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "health check ping failed");
            false
        }
    };

    let response = HealthResponse {
        status: if connected { "ok" } else { "degraded" },
        database: if connected { "connected" } else { "disconnected" },
        backend: store.backend().as_str(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.uptime_seconds(),
    };

    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}
