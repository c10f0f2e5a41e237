// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer token authentication for the staging API.
//!
//! ## Auth Flow
//!
//! 1. The client signs in with the identity provider (IdP)
//! 2. The client sends `Authorization: Bearer <JWT>` (or `?access_token=`
//!    where headers cannot be set)
//! 3. The server:
//!    - Pins the algorithm to RS256 before looking at any key
//!    - Resolves the header `kid` against the IdP's cached key document
//!    - Verifies the signature, then `exp`, `aud` and `iss`
//!    - Exposes `sub` (and `email`, if present) as an [`AuthContext`]
//!
//! ## Security
//!
//! - Every failure is a typed [`AuthError`]; clients only see a generic 401
//! - Key documents are fetched over HTTPS, cached with a TTL, and refreshed
//!   at most once per unknown `kid` (rate limited per document)
//! - No clock skew leeway

pub mod authenticator;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;

#[cfg(test)]
pub(crate) mod testutil;

pub use authenticator::{AuthConfig, AuthMode, BearerAuthenticator};
pub use claims::{AuthContext, TokenClaims};
pub use error::{AuthError, AuthRejection};
pub use extractor::{email, subject, Auth, OptionalAuth};
pub use jwks::{HttpKeySetFetcher, KeySetFetcher, KeySetResolver};

#[cfg(any(test, feature = "dev"))]
pub use extractor::subject_or_default;
