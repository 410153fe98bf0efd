//! HTTP handlers for the ingestion surface.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppResult;
use crate::service::SubmitInput;
use crate::state::AppState;

/// Header carrying the authenticated organisation id when an API gateway
/// fronts this service. Takes precedence over the body field.
const CLIENT_ORG_HEADER: &str = "x-client-org-id";

/// Request body for `POST /v1/logs`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub log_content: String,
    pub client_log_hash: Option<String>,
    pub client_source_org_id: Option<String>,
    /// RFC 3339. Invalid values are logged and ignored, not fatal.
    pub client_timestamp: Option<String>,
}

/// Response body for an accepted submission (HTTP 202).
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request_id: String,
    pub server_log_hash: String,
    pub server_received_timestamp: String,
    pub status: &'static str,
}

/// POST /v1/logs
///
/// Validate the submission, return the receipt synchronously, and hand the
/// record to the batcher without awaiting the flush.
pub async fn submit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let header_org = headers
        .get(CLIENT_ORG_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty());

    let client_timestamp = req.client_timestamp.as_deref().and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid client_timestamp, ignoring");
                None
            }
        }
    });

    let receipt = state.service.submit(SubmitInput {
        log_content: req.log_content,
        client_log_hash: req.client_log_hash,
        client_source_org_id: header_org.or(req.client_source_org_id),
        client_timestamp,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            request_id: receipt.request_id,
            server_log_hash: receipt.server_log_hash,
            server_received_timestamp: receipt
                .server_received_timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
            status: "ACCEPTED",
        }),
    ))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_healthy = state.store.ping().await.is_ok();
    Json(json!({
        "status": if db_healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "db_healthy": db_healthy,
    }))
}
