// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Webhook Signature Verification
//!
//! Payment-provider callbacks carry a `Signature: t=<ts>,v1=<hex>` header,
//! an HMAC-SHA256 over `"{ts}.{raw body}"` keyed with a pre-shared secret.
//!
//! Verification is pure and synchronous: no I/O, no shared state.

pub mod error;
pub mod signature;

use std::fmt;
use std::time::Duration;

pub use error::WebhookError;
pub use signature::{sign, verify, VerifiedWebhook, WebhookSignatureHeader};

/// Header carrying the provider signature.
pub const SIGNATURE_HEADER: &str = "Signature";

/// Default allowed drift between the signed timestamp and now.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Verifier bound to one provider secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Verify against the current time.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<VerifiedWebhook, WebhookError> {
        self.verify_at(body, header, chrono::Utc::now().timestamp())
    }

    /// Verify against an explicit Unix time.
    pub fn verify_at(
        &self,
        body: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<VerifiedWebhook, WebhookError> {
        signature::verify(body, header, &self.secret, self.tolerance, now)
    }
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}
