// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use tokio_util::sync::CancellationToken;

use crate::auth::{BearerAuthenticator, KeySetResolver};
use crate::config::AppConfig;
use crate::webhook::WebhookVerifier;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: BearerAuthenticator,
    pub webhook: WebhookVerifier,
}

impl AppState {
    pub fn new(authenticator: BearerAuthenticator, webhook: WebhookVerifier) -> Self {
        Self {
            authenticator,
            webhook,
        }
    }

    /// Wire the verifiers from configuration, fetching key documents over HTTPS.
    ///
    /// Key document fetches still in flight when `shutdown` fires are abandoned.
    pub fn from_config(config: &AppConfig, shutdown: CancellationToken) -> Result<Self, reqwest::Error> {
        let resolver = KeySetResolver::http(config.jwks_fetch_timeout)?
            .with_cache_ttl(config.jwks_cache_ttl)
            .with_min_refresh_interval(config.jwks_min_refresh_interval);

        Ok(Self::new(
            BearerAuthenticator::new(config.auth.clone(), resolver).with_cancellation(shutdown),
            WebhookVerifier::new(config.webhook_secret.clone())
                .with_tolerance(config.webhook_tolerance),
        ))
    }
}

/// Webhook secret used by [`test_state`].
#[cfg(test)]
pub(crate) const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// State backed by an in-memory key document holding the test signing key.
#[cfg(test)]
pub(crate) fn test_state() -> (
    AppState,
    std::sync::Arc<crate::auth::testutil::CountingFetcher>,
) {
    use crate::auth::testutil::{jwks_document, signing_jwk, CountingFetcher, AUDIENCE, ISSUER, JWKS_URL};
    use crate::auth::AuthConfig;

    let fetcher = CountingFetcher::serving(jwks_document(&[signing_jwk()]));
    let resolver = KeySetResolver::new(fetcher.clone());
    let authenticator = BearerAuthenticator::new(
        AuthConfig::new(ISSUER, AUDIENCE).with_key_document_url(JWKS_URL),
        resolver,
    );

    (
        AppState::new(authenticator, WebhookVerifier::new(TEST_WEBHOOK_SECRET)),
        fetcher,
    )
}
