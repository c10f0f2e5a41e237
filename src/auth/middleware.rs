// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Applies bearer authentication to a whole router subtree and inserts the
//! resulting [`AuthContext`] into request extensions, where the `Auth` and
//! `OptionalAuth` extractors (or [`super::extractor::context`]) pick it up.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/v1/me", get(me))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::authenticator::AuthMode;
use super::error::{AuthError, AuthRejection};
use crate::state::AppState;

/// Reject the request unless it carries a valid bearer token.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    authenticate(state, request, next, AuthMode::Required).await
}

/// Attach an anonymous context when no token is sent; reject invalid tokens.
pub async fn optional_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    authenticate(state, request, next, AuthMode::Optional).await
}

async fn authenticate(state: AppState, request: Request, next: Next, mode: AuthMode) -> Response {
    let (mut parts, body) = request.into_parts();

    match state.authenticator.authenticate(&parts, mode).await {
        Ok(ctx) => {
            parts.extensions.insert(ctx);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => {
            AuthError::log_rejection(&err);
            AuthRejection(err).into_response()
        }
    }
}
