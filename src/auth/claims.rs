// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the per-request authentication context.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::AuthError;

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Claims payload as it arrives, before required-field checks.
///
/// A present claim of the wrong JSON type fails deserialization
/// (`InvalidClaims`); an absent one stays `None` until
/// [`TokenClaims::try_from`] reports it as `ClaimNotFound`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    email: Option<String>,
}

/// Verified claims of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (`sub`), the canonical user identifier
    pub subject: String,
    /// Audience (`aud`)
    pub audience: Audience,
    /// Issuer (`iss`)
    pub issuer: String,
    /// Expiration (`exp`), Unix seconds
    pub expires_at: i64,
    /// Issued at (`iat`), Unix seconds
    pub issued_at: i64,
    /// Email, when the IdP includes it
    pub email: Option<String>,
}

impl TryFrom<RawClaims> for TokenClaims {
    type Error = AuthError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        Ok(Self {
            subject: raw.sub.ok_or(AuthError::ClaimNotFound("sub"))?,
            audience: raw.aud.ok_or(AuthError::ClaimNotFound("aud"))?,
            issuer: raw.iss.ok_or(AuthError::ClaimNotFound("iss"))?,
            expires_at: raw.exp.ok_or(AuthError::ClaimNotFound("exp"))?,
            issued_at: raw.iat.ok_or(AuthError::ClaimNotFound("iat"))?,
            email: raw.email,
        })
    }
}

/// Validated identity attached to a request.
///
/// `subject == None` only for the anonymous context produced by optional
/// authentication when no token was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthContext {
    /// Canonical user ID (`sub` claim)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Email claim, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AuthContext {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            subject: Some(claims.subject),
            email: claims.email,
        }
    }

    /// Empty context for optional authentication without a token.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.subject.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<TokenClaims, AuthError> {
        let raw: RawClaims =
            serde_json::from_value(value).map_err(|e| AuthError::InvalidClaims(e.to_string()))?;
        TokenClaims::try_from(raw)
    }

    fn sample() -> serde_json::Value {
        json!({
            "sub": "auth0|123456789",
            "aud": "https://api.staging.example.com",
            "iss": "https://staging-test.us.auth0.com/",
            "iat": 1700000000,
            "exp": 1700003600,
        })
    }

    #[test]
    fn parses_required_claims() {
        let claims = parse(sample()).unwrap();
        assert_eq!(claims.subject, "auth0|123456789");
        assert_eq!(claims.expires_at, 1700003600);
        assert_eq!(claims.email, None);
    }

    #[test]
    fn missing_subject_is_claim_not_found() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("sub");
        assert_eq!(parse(value), Err(AuthError::ClaimNotFound("sub")));
    }

    #[test]
    fn wrong_type_is_invalid_claims() {
        let mut value = sample();
        value["exp"] = json!("tomorrow");
        assert!(matches!(parse(value), Err(AuthError::InvalidClaims(_))));
    }

    #[test]
    fn audience_accepts_string_or_array() {
        let single = Audience::Single("api".to_string());
        let many = Audience::Many(vec!["other".to_string(), "api".to_string()]);
        assert!(single.contains("api"));
        assert!(many.contains("api"));
        assert!(!many.contains("nope"));
    }

    #[test]
    fn context_from_claims_carries_subject_and_email() {
        let mut value = sample();
        value["email"] = json!("agent@staging.example.com");
        let ctx = AuthContext::from_claims(parse(value).unwrap());
        assert_eq!(ctx.subject.as_deref(), Some("auth0|123456789"));
        assert_eq!(ctx.email.as_deref(), Some("agent@staging.example.com"));
        assert!(!ctx.is_anonymous());
        assert!(AuthContext::anonymous().is_anonymous());
    }
}
