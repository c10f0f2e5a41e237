// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{self, Auth, AuthError, OptionalAuth};

/// The authenticated caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Identity provider subject (`sub`)
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Session state for pages that work with or without sign-in.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Return the authenticated caller's identity.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Identity",
    responses(
        (status = 200, description = "Authenticated caller", body = MeResponse),
        (status = 401, description = "Authentication required", body = auth::error::AuthErrorBody)
    )
)]
pub async fn me(Auth(ctx): Auth) -> Result<Json<MeResponse>, AuthError> {
    let subject = auth::subject(Some(&ctx))?.to_string();
    let email = auth::email(Some(&ctx)).ok().map(str::to_string);

    Ok(Json(MeResponse { subject, email }))
}

/// Describe the current session; anonymous callers are allowed.
#[utoipa::path(
    get,
    path = "/v1/session",
    tag = "Identity",
    responses(
        (status = 200, description = "Session state", body = SessionResponse),
        (status = 401, description = "A token was sent but is invalid", body = auth::error::AuthErrorBody)
    )
)]
pub async fn session(OptionalAuth(ctx): OptionalAuth) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: !ctx.is_anonymous(),
        subject: ctx.subject,
        email: ctx.email,
    })
}
