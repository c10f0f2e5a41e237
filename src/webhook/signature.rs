// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HMAC-SHA256 webhook signatures.
//!
//! Header format: `t=<unix-seconds>,v1=<hex>[,v1=<hex>...]`. The signed
//! message is `"{t}.{body}"`. Several `v1=` entries may be present while the
//! provider rotates its secret; any one match is enough.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_FIELD: &str = "t";
const SIGNATURE_SCHEME: &str = "v1";

/// Parsed `Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignatureHeader {
    /// Signing time, Unix seconds
    pub timestamp: i64,
    /// Decoded `v1=` signatures, in header order
    pub signatures: Vec<Vec<u8>>,
}

impl WebhookSignatureHeader {
    /// Parse a header value.
    ///
    /// The first `t=` wins; unknown schemes such as `v0=` are ignored.
    /// Failures are reported in a fixed order: timestamp missing, timestamp
    /// invalid, first undecodable `v1=`, then no `v1=` at all.
    pub fn parse(value: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut encoded = Vec::new();

        for (key, val) in value
            .split(',')
            .filter_map(|item| item.trim().split_once('='))
        {
            match key.trim() {
                TIMESTAMP_FIELD if timestamp.is_none() => timestamp = Some(val.trim()),
                SIGNATURE_SCHEME => encoded.push(val.trim()),
                _ => {}
            }
        }

        let timestamp = parse_timestamp(timestamp.ok_or(WebhookError::MissingTimestamp)?)?;

        let signatures = encoded
            .into_iter()
            .map(|val| match val {
                "" => Err(WebhookError::InvalidSignatureEncoding),
                val => hex::decode(val).map_err(|_| WebhookError::InvalidSignatureEncoding),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if signatures.is_empty() {
            return Err(WebhookError::NoSignaturesProvided);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Unix seconds in canonical decimal form.
///
/// The MAC is computed over the re-rendered timestamp, so only text that
/// renders back identically (no sign, no leading zeros) is accepted.
fn parse_timestamp(raw: &str) -> Result<i64, WebhookError> {
    let canonical = !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && (raw == "0" || !raw.starts_with('0'));
    if !canonical {
        return Err(WebhookError::InvalidTimestamp);
    }
    raw.parse().map_err(|_| WebhookError::InvalidTimestamp)
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedWebhook {
    pub timestamp: i64,
    pub matched: bool,
}

/// MAC keyed with `secret` over `"{timestamp}.{body}"`.
///
/// A secret the MAC cannot be keyed with can never match, so it is reported
/// as `NoMatchingSignature`.
fn keyed_mac(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::NoMatchingSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Raw HMAC-SHA256 signature of `body` at `timestamp`.
pub fn compute_signature(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<Vec<u8>, WebhookError> {
    Ok(keyed_mac(secret, timestamp, body)?
        .finalize()
        .into_bytes()
        .to_vec())
}

/// Header value a provider would send for `body` signed at `timestamp`.
pub fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
    Ok(format!(
        "{TIMESTAMP_FIELD}={timestamp},{SIGNATURE_SCHEME}={}",
        hex::encode(compute_signature(secret, timestamp, body)?)
    ))
}

/// Whether any provided signature matches. Each comparison is constant time.
pub fn check_signatures(
    header: &WebhookSignatureHeader,
    secret: &[u8],
    body: &[u8],
) -> Result<(), WebhookError> {
    let expected = keyed_mac(secret, header.timestamp, body)?;
    // Every candidate is compared so timing does not reveal which one matched.
    let matched = header
        .signatures
        .iter()
        .fold(false, |matched, candidate| {
            expected.clone().verify_slice(candidate).is_ok() | matched
        });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::NoMatchingSignature)
    }
}

/// `|now - timestamp| <= tolerance`, in either direction.
pub fn check_tolerance(timestamp: i64, now: i64, tolerance: Duration) -> Result<(), WebhookError> {
    if now.abs_diff(timestamp) > tolerance.as_secs() {
        return Err(WebhookError::TimestampOutOfTolerance);
    }
    Ok(())
}

/// Verify a webhook delivery.
///
/// The tolerance window is checked before any signature is compared, so a
/// stale delivery is rejected without computing a MAC.
pub fn verify(
    body: &[u8],
    header: Option<&str>,
    secret: &[u8],
    tolerance: Duration,
    now: i64,
) -> Result<VerifiedWebhook, WebhookError> {
    let header = WebhookSignatureHeader::parse(header.ok_or(WebhookError::MissingSignatureHeader)?)?;
    check_tolerance(header.timestamp, now, tolerance)?;
    check_signatures(&header, secret, body)?;

    Ok(VerifiedWebhook {
        timestamp: header.timestamp,
        matched: true,
    })
}
