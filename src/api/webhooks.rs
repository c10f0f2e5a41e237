// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment provider webhooks.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::{WebhookError, SIGNATURE_HEADER};

/// Fields read from a verified delivery for logging.
#[derive(Debug, Deserialize)]
struct PaymentEvent {
    id: String,
    #[serde(rename = "type", default)]
    event_type: Option<String>,
}

/// Receive a signed payment event.
///
/// The raw body is verified before it is parsed.
#[utoipa::path(
    post,
    path = "/v1/webhooks/payments",
    tag = "Webhooks",
    request_body(content = String, content_type = "application/json", description = "Raw provider event"),
    params(
        ("Signature" = String, Header, description = "t=<unix-seconds>,v1=<hex HMAC-SHA256>")
    ),
    responses(
        (status = 204, description = "Event accepted"),
        (status = 400, description = "Malformed signature header", body = crate::webhook::error::WebhookErrorBody),
        (status = 401, description = "Signature mismatch or stale timestamp", body = crate::webhook::error::WebhookErrorBody),
        (status = 422, description = "Verified payload is not an event", body = crate::error::ErrorBody)
    )
)]
pub async fn payments_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, Response> {
    let signature = match headers.get(SIGNATURE_HEADER) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| reject(WebhookError::InvalidSignatureEncoding))?,
        ),
    };

    let verified = state
        .webhook
        .verify(&body, signature)
        .map_err(reject)?;

    let event: PaymentEvent = serde_json::from_slice(&body).map_err(|e| {
        ApiError::unprocessable(format!("payload is not a payment event: {e}")).into_response()
    })?;

    tracing::info!(
        event_id = %event.id,
        event_type = event.event_type.as_deref().unwrap_or("unknown"),
        signed_at = verified.timestamp,
        "Accepted payment webhook"
    );

    Ok(StatusCode::NO_CONTENT)
}

fn reject(err: WebhookError) -> Response {
    err.log_rejection();
    err.into_response()
}
