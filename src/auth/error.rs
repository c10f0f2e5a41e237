// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every variant is logged server-side with its specific `error_code`. A
//! failed authentication attempt is answered through [`AuthRejection`] with
//! the same generic 401 whatever step rejected the token. An [`AuthError`]
//! returned from a handler (identity accessors) maps through
//! [`AuthError::status_code`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Neither an `Authorization: Bearer` header nor an `access_token` query parameter
    #[error("No bearer token present")]
    MissingToken,

    /// Token structure could not be decoded, or the header has no `kid`
    #[error("Token is malformed: {0}")]
    MalformedToken(String),

    /// Token header declares an algorithm other than RS256
    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key document has no usable key with this `kid`
    #[error("No usable signing key for kid {0:?}")]
    UnknownKey(String),

    /// The key document could not be fetched or parsed
    #[error("Signing key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// Signature does not verify against the resolved key
    #[error("Token signature is invalid")]
    InvalidSignature,

    /// `exp` is not strictly in the future
    #[error("Token has expired")]
    Expired,

    /// `aud` does not contain the configured audience
    #[error("Token audience does not match")]
    AudienceMismatch,

    /// `iss` does not equal the configured issuer
    #[error("Token issuer does not match")]
    IssuerMismatch,

    /// An identity accessor was called on a request with no auth context
    #[error("No authentication context attached to request")]
    NoAuthContext,

    /// A claim is present but has the wrong type or shape
    #[error("Token claims are invalid: {0}")]
    InvalidClaims(String),

    /// A required claim is absent
    #[error("Claim not found: {0}")]
    ClaimNotFound(&'static str),
}

/// Response body returned for every authentication failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthErrorBody {
    pub error: String,
    pub error_code: String,
}

impl AuthErrorBody {
    fn unauthorized() -> Self {
        Self {
            error: "Authentication required".to_string(),
            error_code: "unauthorized".to_string(),
        }
    }

    fn internal() -> Self {
        Self {
            error: "Internal authentication error".to_string(),
            error_code: "internal_error".to_string(),
        }
    }
}

impl AuthError {
    /// Get the error code for this error (server-side logging only).
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Expired => "token_expired",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::NoAuthContext => "no_auth_context",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::ClaimNotFound(_) => "claim_not_found",
        }
    }

    /// Get the HTTP status code for this error when a handler returns it.
    ///
    /// Accessor failures (`NoAuthContext`, `ClaimNotFound`) reached from a
    /// handler mean the route was wired without the auth layer, or reads a
    /// claim the token never had to carry: server errors, not client errors.
    /// The extractors and middleware answer with [`AuthRejection`] instead,
    /// so a token missing a required claim is still a 401.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoAuthContext | AuthError::ClaimNotFound(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Whether this failure indicates a forged or tampered credential.
    ///
    /// `KeySetUnavailable` is an operational signal (the IdP endpoint is down)
    /// and must be kept apart from these in alerting.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            AuthError::UnsupportedAlgorithm(_)
                | AuthError::UnknownKey(_)
                | AuthError::InvalidSignature
                | AuthError::AudienceMismatch
                | AuthError::IssuerMismatch
        )
    }

    /// Emit one structured log line for this rejection.
    pub fn log_rejection(&self) {
        match self {
            AuthError::KeySetUnavailable(detail) => tracing::warn!(
                error_code = self.error_code(),
                security_event = false,
                detail = %detail,
                "Bearer authentication unavailable"
            ),
            AuthError::MissingToken => tracing::debug!(
                error_code = self.error_code(),
                "Bearer authentication rejected"
            ),
            _ if self.is_security_event() => tracing::warn!(
                error_code = self.error_code(),
                security_event = true,
                detail = %self,
                "Bearer authentication rejected"
            ),
            _ => tracing::info!(
                error_code = self.error_code(),
                security_event = false,
                detail = %self,
                "Bearer authentication rejected"
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if status == StatusCode::UNAUTHORIZED {
            AuthErrorBody::unauthorized()
        } else {
            AuthErrorBody::internal()
        };
        (status, Json(body)).into_response()
    }
}

/// A request that failed bearer authentication.
///
/// Rejection type of the `Auth`/`OptionalAuth` extractors and the auth
/// middleware. Always the generic 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection(pub AuthError);

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(AuthErrorBody::unauthorized())).into_response()
    }
}
