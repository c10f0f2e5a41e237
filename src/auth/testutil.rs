// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for authentication tests: RSA keys, token minting, a
//! counting in-memory key fetcher and a local JWKS server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{http::StatusCode, routing::get, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::error::AuthError;
use super::jwks::KeySetFetcher;

pub const KID: &str = "idp-key-2026-01";
pub const ROTATED_KID: &str = "idp-key-2026-07";
pub const ISSUER: &str = "https://staging-test.us.auth0.com/";
pub const AUDIENCE: &str = "https://api.staging.example.com";
pub const SUBJECT: &str = "auth0|123456789";
pub const EMAIL: &str = "agent@staging.example.com";
pub const JWKS_URL: &str = "https://staging-test.us.auth0.com/.well-known/jwks.json";

pub const SIGNING_KEY_PEM: &str = include_str!("../../tests/fixtures/idp_signing_key.pem");
pub const ROTATED_KEY_PEM: &str = include_str!("../../tests/fixtures/rotated_signing_key.pem");

const SIGNING_KEY_N: &str = "okkcqeWd4ke8Ek4wdA0Hn21L5KVkb5L7x_sAyZ5ydSVeBKWGlWMHmjo012fIvgHHqlYbAvWGd7si-vX-lfYp7t9bhL9kR5ZwnIRY7myaU-LJ-chTdIiFudZxMcImCEN6Foa0JTmAVP_7JaMzGInA89ZVyOSUie6r4N5DR7iqbFseukmzXsE9T3K2TpaAGhNHcVeWHvdbeLT36sklUY4SyOr6D9VDaryMTNSZVW4AiQvSpn8xBX7e5nU3e1xNo2Yz5--UKPbbTim0T5MLP6PND_4nzfr0kxh187L_RzWGWBx58-ArCnWEFk1z86_3m7ifebRLMaXDvoBCI1cE-voYuw";
const ROTATED_KEY_N: &str = "xadOkvdMwGVbnBNoarc6OiJmpaOVizM_c_HQjLMbetkcDyp_2MkrPcpE4GLKFX0hegxFDXEj772oqHdfS2Cvy40larn65K0xpIISLm97jSZFUqSPZwOUcFXXpMAC4plim_v062WmIMO7ga9XLU4tm_W2bP4hHlb3ifdPXZUDKT-VK8dwTyS8Qco9M7lmxrS4oM8Kag6rxuusZnw3B18NnbWF7-C_VZ1O0KYEEYvS_4nuuEQEevNp7tDem8OsFaEz5HMOGtvm_a4ZeFPSUxgEisj1GCmE6w4DE65yLhWSFgmJCZtAuOrRtGBfj9BBmRCpDdMjN3NxpQTyTUqaje5NKQ";
const RSA_EXPONENT: &str = "AQAB";

pub fn signing_jwk() -> Value {
    json!({"kty": "RSA", "kid": KID, "use": "sig", "alg": "RS256", "n": SIGNING_KEY_N, "e": RSA_EXPONENT})
}

pub fn rotated_jwk() -> Value {
    json!({"kty": "RSA", "kid": ROTATED_KID, "use": "sig", "n": ROTATED_KEY_N, "e": RSA_EXPONENT})
}

pub fn jwks_document(keys: &[Value]) -> Vec<u8> {
    serde_json::to_vec(&json!({ "keys": keys })).unwrap()
}

/// Claims accepted by the default test configuration, valid for an hour.
pub fn valid_claims() -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "sub": SUBJECT,
        "aud": AUDIENCE,
        "iss": ISSUER,
        "iat": now,
        "exp": now + 3600,
        "email": EMAIL,
    })
}

/// RS256 token signed with `pem`, with an optional `kid` header.
pub fn mint_with_key(pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// RS256 token signed with the primary fixture key under [`KID`].
pub fn mint_token(claims: &Value) -> String {
    mint_with_key(SIGNING_KEY_PEM, Some(KID), claims)
}

/// Token assembled from raw JSON parts with an arbitrary signature segment.
pub fn forge_token(header: &Value, claims: &Value, signature: &[u8]) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(signature),
    )
}

/// In-memory fetcher that counts calls and can be slowed down or failed.
pub struct CountingFetcher {
    document: Mutex<Option<Vec<u8>>>,
    calls: AtomicUsize,
    delay_ms: AtomicU64,
}

impl CountingFetcher {
    pub fn serving(document: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            document: Mutex::new(Some(document)),
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            document: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        })
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn replace_document(&self, document: Vec<u8>) {
        *self.document.lock().unwrap() = Some(document);
    }

    /// Make every later fetch fail as if the endpoint were down.
    pub fn fail(&self) {
        *self.document.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let document = self.document.lock().unwrap().clone();
        document.ok_or_else(|| AuthError::KeySetUnavailable("connection refused".to_string()))
    }
}

/// Serve `body` with `status` at `/.well-known/jwks.json` on an ephemeral port.
pub async fn spawn_jwks_server(body: Vec<u8>, status: u16) -> (SocketAddr, JoinHandle<()>) {
    let status = StatusCode::from_u16(status).unwrap();
    let app = Router::new().route(
        "/.well-known/jwks.json",
        get(move || {
            let body = body.clone();
            async move { (status, [("content-type", "application/json")], body) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, handle)
}
