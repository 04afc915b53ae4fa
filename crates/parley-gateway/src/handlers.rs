// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers: webhook intake, health and metrics.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;

use crate::payload;
use crate::server::{GatewayState, HealthState};

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// POST /webhook/{provider}
///
/// Normalizes the body and queues it for a processing pass. Replies
/// `202 Accepted` without waiting for the pass to run.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Response {
    let msg = match payload::normalize(&body) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(provider = %provider, error = %e, "rejecting webhook payload");
            return error(StatusCode::BAD_REQUEST, e);
        }
    };

    tracing::debug!(
        provider = %provider,
        phone = %msg.phone_number,
        device_id = %msg.device_id,
        from_operator = msg.from_operator,
        "webhook received"
    );

    match state.inbound_tx.try_send(msg) {
        Ok(()) => (StatusCode::ACCEPTED, Json(AcceptedResponse { status: "accepted" })).into_response(),
        Err(TrySendError::Full(_)) => {
            tracing::warn!(provider = %provider, "inbound queue full, shedding webhook");
            error(StatusCode::SERVICE_UNAVAILABLE, "inbound queue full")
        }
        Err(TrySendError::Closed(_)) => error(StatusCode::SERVICE_UNAVAILABLE, "shutting down"),
    }
}

/// GET /health
pub async fn get_health(State(health): State<HealthState>) -> Json<HealthResponse> {
    let status = match &health.status {
        Some(check) => check(),
        None => "ok".to_string(),
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
pub async fn get_metrics(State(health): State<HealthState>) -> Response {
    match &health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "metrics disabled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
    }

    #[test]
    fn accepted_response_serializes() {
        let json = serde_json::to_string(&AcceptedResponse { status: "accepted" }).unwrap();
        assert_eq!(json, r#"{"status":"accepted"}"#);
    }
}
