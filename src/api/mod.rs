// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{self, AuthContext},
    error::ErrorBody,
    state::AppState,
    webhook::error::WebhookErrorBody,
};

pub mod health;
pub mod identity;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(identity::me))
        .route_layer(from_fn_with_state(state.clone(), auth::middleware::require_auth));

    let v1_routes = Router::new()
        .merge(protected)
        .route("/session", get(identity::session))
        .route("/webhooks/payments", post(webhooks::payments_webhook));

    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        identity::me,
        identity::session,
        webhooks::payments_webhook
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            identity::MeResponse,
            identity::SessionResponse,
            AuthContext,
            auth::error::AuthErrorBody,
            WebhookErrorBody,
            ErrorBody
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Identity", description = "Authenticated caller identity"),
        (name = "Webhooks", description = "Signed payment provider callbacks")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testutil::{mint_token, valid_claims, EMAIL, SUBJECT};
    use crate::state::{test_state, TEST_WEBHOOK_SECRET};
    use crate::webhook::sign;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        router(test_state().0)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_with(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn webhook_request(body: &'static str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/payments")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("Signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = app();
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn liveness_needs_no_token() {
        let response = app().oneshot(get_with("/health/live", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn me_returns_subject_and_email() {
        let token = mint_token(&valid_claims());
        let response = app().oneshot(get_with("/v1/me", Some(&token))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["subject"], SUBJECT);
        assert_eq!(body["email"], EMAIL);
    }

    #[tokio::test]
    async fn me_accepts_query_parameter_token() {
        let token = mint_token(&valid_claims());
        let uri = format!("/v1/me?access_token={token}");
        let response = app().oneshot(get_with(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn me_rejects_without_revealing_reason() {
        let mut expired = valid_claims();
        expired["exp"] = Value::from(now() - 10);

        for token in [None, Some(mint_token(&expired)), Some("garbage".to_string())] {
            let response = app()
                .oneshot(get_with("/v1/me", token.as_deref()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                body_json(response).await,
                serde_json::json!({"error": "Authentication required", "error_code": "unauthorized"})
            );
        }
    }

    #[tokio::test]
    async fn token_missing_subject_is_unauthorized_not_server_error() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("sub");
        let token = mint_token(&claims);

        for uri in ["/v1/me", "/v1/session"] {
            let response = app().oneshot(get_with(uri, Some(&token))).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body_json(response).await["error_code"], "unauthorized");
        }
    }

    #[tokio::test]
    async fn session_is_anonymous_without_token() {
        let response = app().oneshot(get_with("/v1/session", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"authenticated": false}));
    }

    #[tokio::test]
    async fn session_reports_signed_in_caller() {
        let token = mint_token(&valid_claims());
        let response = app()
            .oneshot(get_with("/v1/session", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["subject"], SUBJECT);
    }

    #[tokio::test]
    async fn session_rejects_invalid_token() {
        let response = app()
            .oneshot(get_with("/v1/session", Some("not-a-jwt")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_accepts_signed_event() {
        let body = r#"{"id":"evt_123","type":"payment.succeeded"}"#;
        let signature = sign(TEST_WEBHOOK_SECRET.as_bytes(), now(), body.as_bytes()).unwrap();

        let response = app()
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn webhook_without_signature_is_bad_request() {
        let response = app()
            .oneshot(webhook_request(r#"{"id":"evt_123"}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error_code"], "invalid_webhook");
    }

    #[tokio::test]
    async fn webhook_with_wrong_secret_is_unauthorized() {
        let body = r#"{"id":"evt_123"}"#;
        let signature = sign(b"whsec_other", now(), body.as_bytes()).unwrap();

        let response = app()
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn webhook_with_stale_timestamp_is_unauthorized() {
        let body = r#"{"id":"evt_123"}"#;
        let signature = sign(TEST_WEBHOOK_SECRET.as_bytes(), now() - 3600, body.as_bytes()).unwrap();

        let response = app()
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verified_non_event_payload_is_unprocessable() {
        let body = r#"{"object":"event"}"#;
        let signature = sign(TEST_WEBHOOK_SECRET.as_bytes(), now(), body.as_bytes()).unwrap();

        let response = app()
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = app()
            .oneshot(get_with("/api-doc/openapi.json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let doc = body_json(response).await;
        assert!(doc["paths"]["/v1/webhooks/payments"].is_object());
    }
}
