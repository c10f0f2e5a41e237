// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token validation pipeline.
//!
//! Steps run in a fixed order and stop at the first failure:
//!
//! 1. extract the token (header, then `access_token` query parameter)
//! 2. read the header; `alg` must be RS256 and `kid` must be present
//! 3. resolve the signing key from the configured key document
//! 4. verify the signature
//! 5. check `exp`, then `aud`, then `iss`
//!
//! The algorithm is pinned here and is not configurable.

use std::sync::Arc;

use axum::http::request::Parts;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::claims::{AuthContext, RawClaims, TokenClaims};
use super::error::AuthError;
use super::extractor::extract_token;
use super::jwks::KeySetResolver;

/// The only accepted token algorithm.
pub const PINNED_ALGORITHM: Algorithm = Algorithm::RS256;
const PINNED_ALGORITHM_NAME: &str = "RS256";

/// What the authenticator expects of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Expected `iss`
    pub issuer: String,
    /// Expected `aud`
    pub audience: String,
    /// Key document for this issuer
    pub key_document_url: String,
}

impl AuthConfig {
    /// Create a config whose key document is `<issuer>/.well-known/jwks.json`.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let key_document_url = format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'));
        Self {
            issuer,
            audience: audience.into(),
            key_document_url,
        }
    }

    /// Override the key document URL.
    pub fn with_key_document_url(mut self, url: impl Into<String>) -> Self {
        self.key_document_url = url.into();
        self
    }
}

/// Whether a request without a token is rejected or let through anonymously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Required,
    Optional,
}

/// Header fields read before the signature is checked.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// Validates bearer tokens for one issuer/audience pair.
#[derive(Clone)]
pub struct BearerAuthenticator {
    config: Arc<AuthConfig>,
    resolver: KeySetResolver,
    cancel: CancellationToken,
}

impl BearerAuthenticator {
    pub fn new(config: AuthConfig, resolver: KeySetResolver) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon key document fetches once `cancel` fires (server shutdown);
    /// waiting requests then fail with `KeySetUnavailable`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn resolver(&self) -> &KeySetResolver {
        &self.resolver
    }

    /// Authenticate a request.
    ///
    /// In [`AuthMode::Optional`] a request with no token yields an anonymous
    /// context; a token that is present but invalid is rejected in both modes.
    pub async fn authenticate(&self, parts: &Parts, mode: AuthMode) -> Result<AuthContext, AuthError> {
        let token = match extract_token(parts) {
            Ok(token) => token,
            Err(AuthError::MissingToken) if mode == AuthMode::Optional => {
                return Ok(AuthContext::anonymous());
            }
            Err(err) => return Err(err),
        };

        let claims = self.validate_token(&token).await?;
        Ok(AuthContext::from_claims(claims))
    }

    /// Validate a raw token against the current time.
    pub async fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.validate_token_at(token, Utc::now().timestamp()).await
    }

    /// Validate a raw token as of `now` (Unix seconds).
    pub async fn validate_token_at(&self, token: &str, now: i64) -> Result<TokenClaims, AuthError> {
        let header = read_unverified_header(token)?;
        if header.alg != PINNED_ALGORITHM_NAME {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("missing kid".to_string()))?;

        let key = self
            .resolver
            .resolve_with_cancel(&self.config.key_document_url, &kid, &self.cancel)
            .await?;

        let claims = verify_signature(token, key.decoding_key())?;
        validate_claims(&claims, &self.config, now)?;

        Ok(claims)
    }
}

/// Decode the JOSE header without trusting anything in it yet.
fn read_unverified_header(token: &str) -> Result<UnverifiedHeader, AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(_payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken("expected three segments".to_string()));
    };

    let bytes = Base64UrlUnpadded::decode_vec(header)
        .map_err(|_| AuthError::MalformedToken("header is not base64url".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("header: {e}")))
}

/// Verify the RS256 signature and deserialize the claims.
///
/// Claim checks are disabled here; [`validate_claims`] runs them afterwards
/// in a fixed order against an explicit clock.
fn verify_signature(token: &str, key: &DecodingKey) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(PINNED_ALGORITHM);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<RawClaims>(token, key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::Json(err) => AuthError::InvalidClaims(err.to_string()),
        ErrorKind::Base64(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
            AuthError::MalformedToken(e.to_string())
        }
        ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
            AuthError::UnknownKey("resolved key is unusable".to_string())
        }
        _ => AuthError::InvalidSignature,
    })?;

    TokenClaims::try_from(data.claims)
}

fn validate_claims(claims: &TokenClaims, config: &AuthConfig, now: i64) -> Result<(), AuthError> {
    if claims.expires_at <= now {
        return Err(AuthError::Expired);
    }
    if !claims.audience.contains(&config.audience) {
        return Err(AuthError::AudienceMismatch);
    }
    if claims.issuer != config.issuer {
        return Err(AuthError::IssuerMismatch);
    }
    Ok(())
}
