// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users, and identity accessors.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(ctx): Auth) -> impl IntoResponse {
//!     // ctx is AuthContext with a subject
//! }
//! ```
//!
//! `OptionalAuth` lets requests without a token through with an anonymous
//! context, but still rejects a token that is present and invalid.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, Extensions},
};

use super::authenticator::AuthMode;
use super::error::AuthRejection;
use super::{AuthContext, AuthError};
use crate::state::AppState;

/// Query parameter accepted when no `Authorization` header is sent
/// (browser `EventSource` cannot set headers).
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Subject returned by [`subject_or_default`] when no context is attached.
#[cfg(any(test, feature = "dev"))]
pub const PLACEHOLDER_SUBJECT: &str = "dev|local-test-user";

/// Pull the raw bearer token out of a request.
///
/// The `Authorization: Bearer` header wins; otherwise the `access_token`
/// query parameter is used. An `Authorization` header with another scheme is
/// not a bearer token and falls through to the query parameter.
pub fn extract_token(parts: &Parts) -> Result<String, AuthError> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AuthError::MalformedToken("authorization header is not ASCII".to_string()))?;
        if let Some((scheme, token)) = value.split_once(' ') {
            if scheme.eq_ignore_ascii_case("Bearer") {
                let token = token.trim();
                if token.is_empty() {
                    return Err(AuthError::MalformedToken("empty bearer token".to_string()));
                }
                return Ok(token.to_string());
            }
        }
    }

    parts
        .uri
        .query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == ACCESS_TOKEN_PARAM)
                .map(|(_, value)| value.trim().to_string())
        })
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Subject of the attached context.
pub fn subject(ctx: Option<&AuthContext>) -> Result<&str, AuthError> {
    ctx.ok_or(AuthError::NoAuthContext)?
        .subject
        .as_deref()
        .ok_or(AuthError::ClaimNotFound("sub"))
}

/// Email of the attached context.
pub fn email(ctx: Option<&AuthContext>) -> Result<&str, AuthError> {
    ctx.ok_or(AuthError::NoAuthContext)?
        .email
        .as_deref()
        .ok_or(AuthError::ClaimNotFound("email"))
}

/// Subject of the attached context, or a fixed placeholder when none is
/// attached. Only compiled into test and `dev` builds.
#[cfg(any(test, feature = "dev"))]
pub fn subject_or_default(ctx: Option<&AuthContext>) -> Result<&str, AuthError> {
    match ctx {
        None => {
            tracing::warn!("No auth context, using placeholder identity (dev build)");
            Ok(PLACEHOLDER_SUBJECT)
        }
        Some(_) => subject(ctx),
    }
}

/// Context inserted by the auth middleware, if any.
pub fn context(extensions: &Extensions) -> Option<&AuthContext> {
    extensions.get::<AuthContext>()
}

/// Extractor for authenticated requests.
///
/// # Example
///
/// ```rust,ignore
/// async fn whoami(Auth(ctx): Auth) -> Result<Json<String>, AuthError> {
///     Ok(Json(subject(Some(&ctx))?.to_string()))
/// }
/// ```
pub struct Auth(pub AuthContext);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // First check if middleware already authenticated this request
        if let Some(ctx) = context(&parts.extensions).filter(|ctx| !ctx.is_anonymous()) {
            return Ok(Auth(ctx.clone()));
        }

        let ctx = state
            .authenticator
            .authenticate(parts, AuthMode::Required)
            .await
            .inspect_err(AuthError::log_rejection)
            .map_err(AuthRejection)?;

        Ok(Auth(ctx))
    }
}

/// Optional authentication extractor.
///
/// Yields an anonymous context when no token is sent. A token that is sent
/// but fails validation is rejected exactly as with [`Auth`].
pub struct OptionalAuth(pub AuthContext);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = context(&parts.extensions) {
            return Ok(OptionalAuth(ctx.clone()));
        }

        let ctx = state
            .authenticator
            .authenticate(parts, AuthMode::Optional)
            .await
            .inspect_err(AuthError::log_rejection)
            .map_err(AuthRejection)?;

        Ok(OptionalAuth(ctx))
    }
}
