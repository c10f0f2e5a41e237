// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup; a missing or invalid value stops the server before it
//! binds.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `AUTH_ISSUER` | Expected JWT issuer claim | Required |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Required |
//! | `AUTH_JWKS_URL` | Signing key document URL | `<issuer>/.well-known/jwks.json` |
//! | `AUTH_JWKS_CACHE_TTL_SECS` | Key set cache lifetime | `300` |
//! | `AUTH_JWKS_MIN_REFRESH_SECS` | Minimum gap between forced refreshes | `30` |
//! | `AUTH_JWKS_FETCH_TIMEOUT_SECS` | Key document fetch deadline | `10` |
//! | `PAYMENTS_WEBHOOK_SECRET` | Payment provider webhook secret | Required |
//! | `PAYMENTS_WEBHOOK_TOLERANCE_SECS` | Webhook timestamp tolerance | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::auth::{jwks, AuthConfig};
use crate::webhook;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Expected `iss` claim, e.g. `https://tenant.us.auth0.com/`.
pub const AUTH_ISSUER_ENV: &str = "AUTH_ISSUER";
/// Expected `aud` claim.
pub const AUTH_AUDIENCE_ENV: &str = "AUTH_AUDIENCE";
/// Overrides the key document URL derived from the issuer.
///
/// Must be `https` unless built with the `dev` feature.
pub const AUTH_JWKS_URL_ENV: &str = "AUTH_JWKS_URL";
pub const AUTH_JWKS_CACHE_TTL_ENV: &str = "AUTH_JWKS_CACHE_TTL_SECS";
pub const AUTH_JWKS_MIN_REFRESH_ENV: &str = "AUTH_JWKS_MIN_REFRESH_SECS";
pub const AUTH_JWKS_FETCH_TIMEOUT_ENV: &str = "AUTH_JWKS_FETCH_TIMEOUT_SECS";

pub const WEBHOOK_SECRET_ENV: &str = "PAYMENTS_WEBHOOK_SECRET";
pub const WEBHOOK_TOLERANCE_ENV: &str = "PAYMENTS_WEBHOOK_TOLERANCE_SECS";

/// `json` for log aggregation, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Fully resolved server configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub auth: AuthConfig,
    pub jwks_cache_ttl: Duration,
    pub jwks_min_refresh_interval: Duration,
    pub jwks_fetch_timeout: Duration,
    pub webhook_secret: String,
    pub webhook_tolerance: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its raw value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.or_default(HOST_ENV, DEFAULT_HOST);
        let port = env.parse_or(PORT_ENV, DEFAULT_PORT)?;
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e| ConfigError::Invalid {
                    name: HOST_ENV,
                    reason: format!("{e}"),
                })?;

        let issuer = env.required(AUTH_ISSUER_ENV)?;
        let audience = env.required(AUTH_AUDIENCE_ENV)?;
        let mut auth = AuthConfig::new(issuer, audience);
        if let Some(url) = env.optional(AUTH_JWKS_URL_ENV) {
            auth = auth.with_key_document_url(url);
        }
        validate_key_document_url(&auth.key_document_url)?;

        Ok(Self {
            bind_addr,
            auth,
            jwks_cache_ttl: env.secs_or(AUTH_JWKS_CACHE_TTL_ENV, jwks::DEFAULT_CACHE_TTL)?,
            jwks_min_refresh_interval: env
                .secs_or(AUTH_JWKS_MIN_REFRESH_ENV, jwks::DEFAULT_MIN_REFRESH_INTERVAL)?,
            jwks_fetch_timeout: env
                .secs_or(AUTH_JWKS_FETCH_TIMEOUT_ENV, jwks::DEFAULT_FETCH_TIMEOUT)?,
            webhook_secret: env.required(WEBHOOK_SECRET_ENV)?,
            webhook_tolerance: env.secs_or(WEBHOOK_TOLERANCE_ENV, webhook::DEFAULT_TOLERANCE)?,
            log_format: match env.optional(LOG_FORMAT_ENV).as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("auth", &self.auth)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwks_min_refresh_interval", &self.jwks_min_refresh_interval)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("webhook_secret", &"<redacted>")
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("log_format", &self.log_format)
            .finish()
    }
}

/// Key documents are trusted to publish signing keys, so they are only
/// fetched over TLS. The `dev` feature also permits plain HTTP for local IdP
/// mocks.
fn validate_key_document_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: AUTH_JWKS_URL_ENV,
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(format!("{raw:?} is not a URL: {e}")))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if cfg!(feature = "dev") => Ok(()),
        scheme => Err(invalid(format!("scheme {scheme:?} is not allowed, use https"))),
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: format!("{raw:?}: {e}"),
            }),
        }
    }

    fn secs_or(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse_or(name, default.as_secs()).map(Duration::from_secs)
    }
}
