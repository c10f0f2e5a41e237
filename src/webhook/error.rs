// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook verification errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("Signature header is missing")]
    MissingSignatureHeader,

    #[error("Signature header has no t= field")]
    MissingTimestamp,

    #[error("Signature timestamp is not an integer")]
    InvalidTimestamp,

    #[error("Signature value is not valid hex")]
    InvalidSignatureEncoding,

    #[error("Signature header has no v1= entries")]
    NoSignaturesProvided,

    #[error("No provided signature matches the payload")]
    NoMatchingSignature,

    #[error("Signature timestamp is outside the tolerance window")]
    TimestampOutOfTolerance,
}

/// Response body returned for every webhook rejection.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookErrorBody {
    pub error: String,
    pub error_code: String,
}

impl WebhookError {
    pub fn error_code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignatureHeader => "missing_signature_header",
            WebhookError::MissingTimestamp => "missing_timestamp",
            WebhookError::InvalidTimestamp => "invalid_timestamp",
            WebhookError::InvalidSignatureEncoding => "invalid_signature_encoding",
            WebhookError::NoSignaturesProvided => "no_signatures_provided",
            WebhookError::NoMatchingSignature => "no_matching_signature",
            WebhookError::TimestampOutOfTolerance => "timestamp_out_of_tolerance",
        }
    }

    /// 400 when the header cannot be parsed, 401 when it parses but does not
    /// authenticate the request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::NoMatchingSignature | WebhookError::TimestampOutOfTolerance => {
                StatusCode::UNAUTHORIZED
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_security_event(&self) -> bool {
        matches!(self, WebhookError::NoMatchingSignature)
    }

    /// Emit one structured log line for this rejection.
    pub fn log_rejection(&self) {
        if self.is_security_event() {
            tracing::warn!(
                error_code = self.error_code(),
                security_event = true,
                "Webhook signature rejected"
            );
        } else {
            tracing::info!(
                error_code = self.error_code(),
                security_event = false,
                "Webhook signature rejected"
            );
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let body = WebhookErrorBody {
            error: "Invalid webhook signature".to_string(),
            error_code: "invalid_webhook".to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
