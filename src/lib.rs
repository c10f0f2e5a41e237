// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Image Staging Server - Inbound Trust Verification
//!
//! Verifies what comes into the staging backend before any business logic
//! sees it: bearer tokens issued by the identity provider, and signed
//! callbacks from the payment provider.
//!
//! ## Modules
//!
//! - `auth` - Bearer token authentication (RS256 against a cached JWKS)
//! - `webhook` - HMAC-SHA256 webhook signature verification
//! - `api` - HTTP surface (Axum) wiring both into routes
//! - `config` - Environment configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod webhook;
