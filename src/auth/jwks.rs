// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching, parsing and caching.
//!
//! ## Security
//!
//! - Only RSA signature keys are kept; other entries are skipped, never fatal
//! - A key whose `n`/`e` cannot be decoded is dropped on its own
//! - Key sets are cached per document URL with a TTL
//! - Concurrent misses for one document share a single in-flight fetch
//! - An unknown `kid` forces at most one refresh, rate limited per document
//! - Fetch failures fail closed (`KeySetUnavailable`); no stale fallback
//!
//! ## Usage
//!
//! Build one `KeySetResolver` at startup and share it through `AppState`.
//! The bearer authenticator calls [`KeySetResolver::resolve`] with its
//! configured document URL and the token's `kid`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::AuthError;

/// Default key set cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Minimum time since the last fetch attempt before an unknown `kid` may
/// force a refetch.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Deadline for a single key document fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const RSA_KEY_TYPE: &str = "RSA";

/// Transport used to download a key document.
///
/// Injected into [`KeySetResolver`] so tests (and alternative transports)
/// never rely on a process-wide client.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Return the raw body of the document at `url`.
    ///
    /// Any transport failure or non-2xx status is `KeySetUnavailable`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AuthError>;
}

/// `reqwest`-backed fetcher.
#[derive(Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Build a fetcher with its own client and a request timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AuthError> {
        debug!(url, "Fetching signing key document");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "HTTP {} from key document endpoint",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        Ok(body.to_vec())
    }
}

/// An RSA public signing key published in the key document.
pub struct SigningKey {
    id: String,
    key_type: String,
    usage: Option<String>,
    modulus: Vec<u8>,
    exponent: Vec<u8>,
    decoding_key: OnceLock<DecodingKey>,
}

impl SigningKey {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn usage(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    /// Big-endian modulus bytes.
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Big-endian public exponent bytes.
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// Public key object for signature verification, built on first use.
    pub fn decoding_key(&self) -> &DecodingKey {
        self.decoding_key
            .get_or_init(|| DecodingKey::from_rsa_raw_components(&self.modulus, &self.exponent))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("key_type", &self.key_type)
            .field("usage", &self.usage)
            .field("modulus_len", &self.modulus.len())
            .finish()
    }
}

/// Immutable set of usable signing keys from one fetch, indexed by `kid`.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl KeySet {
    /// Parse a key document.
    ///
    /// Malformed JSON (or a document without a `keys` array) fails the whole
    /// set. Individual entries that are not RSA signature keys, or whose
    /// components do not decode, are skipped.
    pub fn parse(document: &[u8]) -> Result<Self, AuthError> {
        let document: KeyDocument = serde_json::from_slice(document)
            .map_err(|e| AuthError::KeySetUnavailable(format!("malformed key document: {e}")))?;

        let mut keys = HashMap::new();
        for entry in document.keys {
            let Ok(jwk) = serde_json::from_value::<RawJwk>(entry) else {
                debug!("Skipping key entry with unexpected shape");
                continue;
            };
            let Some(key) = jwk.into_signing_key() else {
                continue;
            };
            if keys.contains_key(&key.id) {
                warn!(kid = %key.id, "Duplicate kid in key document, keeping first");
                continue;
            }
            keys.insert(key.id.clone(), Arc::new(key));
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Deserialize)]
struct KeyDocument {
    keys: Vec<serde_json::Value>,
}

/// A single JWK entry as published.
#[derive(Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl RawJwk {
    fn into_signing_key(self) -> Option<SigningKey> {
        if self.kty != RSA_KEY_TYPE {
            debug!(kty = %self.kty, "Skipping non-RSA key");
            return None;
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            debug!("Skipping non-signature key");
            return None;
        }
        if self.alg.as_deref().is_some_and(|a| a != "RS256") {
            debug!(alg = ?self.alg, "Skipping key published for another algorithm");
            return None;
        }
        let Some(id) = self.kid else {
            debug!("Skipping RSA key without kid");
            return None;
        };

        let modulus = decode_component(self.n.as_deref());
        let exponent = decode_component(self.e.as_deref());
        let (Some(modulus), Some(exponent)) = (modulus, exponent) else {
            warn!(kid = %id, "Skipping RSA key with undecodable components");
            return None;
        };

        Some(SigningKey {
            id,
            key_type: self.kty,
            usage: self.key_use,
            modulus,
            exponent,
            decoding_key: OnceLock::new(),
        })
    }
}

/// Decode an unpadded base64url big-endian integer; empty is invalid.
fn decode_component(value: Option<&str>) -> Option<Vec<u8>> {
    let bytes = Base64UrlUnpadded::decode_vec(value?).ok()?;
    (!bytes.is_empty()).then_some(bytes)
}

#[derive(Clone)]
struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

#[derive(Default)]
struct SlotState {
    current: Option<CachedKeySet>,
    /// Completed fetch attempts; lets waiters detect that a fetch happened
    /// while they queued on the refresh lock.
    attempts: u64,
    /// When the last fetch finished, successful or not; gates forced refreshes.
    last_attempt: Option<Instant>,
    last_error: Option<AuthError>,
}

/// Cache entry for one key document URL.
#[derive(Default)]
struct DocumentSlot {
    state: RwLock<SlotState>,
    /// Held for the duration of a fetch; single writer per document.
    refresh: Mutex<()>,
}

/// Resolves `kid`s to signing keys from remotely published key documents.
#[derive(Clone)]
pub struct KeySetResolver {
    fetcher: Arc<dyn KeySetFetcher>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    fetch_timeout: Duration,
    slots: Arc<RwLock<HashMap<String, Arc<DocumentSlot>>>>,
}

impl KeySetResolver {
    /// Create a resolver around an injected fetcher.
    pub fn new(fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            fetcher,
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a resolver with an HTTP fetcher using `fetch_timeout`.
    pub fn http(fetch_timeout: Duration) -> Result<Self, reqwest::Error> {
        let fetcher = HttpKeySetFetcher::new(fetch_timeout)?;
        Ok(Self::new(Arc::new(fetcher)).with_fetch_timeout(fetch_timeout))
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolve `kid` from the document at `url`.
    pub async fn resolve(&self, url: &str, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        let slot = self.slot(url).await;

        let (entry, attempts_seen) = self.current_or_fetch(&slot, url).await?;
        if let Some(key) = entry.keys.get(kid) {
            return Ok(key);
        }

        // Unknown kid: the IdP may have rotated keys since our last fetch.
        let entry = self.forced_refresh(&slot, url, attempts_seen).await?;
        entry
            .keys
            .get(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    /// Resolve, giving up with `KeySetUnavailable` once `cancel` fires.
    ///
    /// Dropping the in-flight fetch releases the per-document lock, so a
    /// cancelled caller never blocks the others.
    pub async fn resolve_with_cancel(
        &self,
        url: &str,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<SigningKey>, AuthError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::KeySetUnavailable(
                "key document fetch cancelled".to_string(),
            )),
            result = self.resolve(url, kid) => result,
        }
    }

    /// Fetch the document now, replacing any cached set.
    pub async fn refresh(&self, url: &str) -> Result<usize, AuthError> {
        let slot = self.slot(url).await;
        let _guard = slot.refresh.lock().await;
        let entry = self.fetch_into(&slot, url).await?;
        Ok(entry.keys.len())
    }

    /// Check if a fresh key set for `url` is cached.
    pub async fn is_cached(&self, url: &str) -> bool {
        let slots = self.slots.read().await;
        let Some(slot) = slots.get(url) else {
            return false;
        };
        let state = slot.state.read().await;
        state
            .current
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    async fn slot(&self, url: &str) -> Arc<DocumentSlot> {
        if let Some(slot) = self.slots.read().await.get(url) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(url.to_string())
            .or_default()
            .clone()
    }

    /// Return the cached set if fresh, otherwise fetch it (single-flight).
    async fn current_or_fetch(
        &self,
        slot: &DocumentSlot,
        url: &str,
    ) -> Result<(CachedKeySet, u64), AuthError> {
        let attempts_before = {
            let state = slot.state.read().await;
            if let Some(entry) = self.fresh(&state) {
                return Ok((entry, state.attempts));
            }
            state.attempts
        };

        let _guard = slot.refresh.lock().await;

        {
            let state = slot.state.read().await;
            if let Some(entry) = self.fresh(&state) {
                return Ok((entry, state.attempts));
            }
            // Another caller fetched and failed while we queued; share its outcome.
            if state.attempts != attempts_before {
                if let Some(err) = &state.last_error {
                    return Err(err.clone());
                }
            }
        }

        let entry = self.fetch_into(slot, url).await?;
        let attempts = slot.state.read().await.attempts;
        Ok((entry, attempts))
    }

    /// Refetch after a `kid` miss, unless someone already did or the last
    /// attempt is younger than the minimum refresh interval.
    ///
    /// The interval counts failed attempts too, so an unreachable document
    /// is not hammered by tokens carrying random `kid`s.
    async fn forced_refresh(
        &self,
        slot: &DocumentSlot,
        url: &str,
        attempts_seen: u64,
    ) -> Result<CachedKeySet, AuthError> {
        let _guard = slot.refresh.lock().await;

        {
            let state = slot.state.read().await;
            if state.attempts != attempts_seen {
                return match (&state.last_error, &state.current) {
                    (Some(err), _) => Err(err.clone()),
                    (None, Some(entry)) => Ok(entry.clone()),
                    (None, None) => Err(AuthError::KeySetUnavailable(
                        "key set evicted during refresh".to_string(),
                    )),
                };
            }
            let rate_limited = state
                .last_attempt
                .is_some_and(|at| at.elapsed() < self.min_refresh_interval);
            if rate_limited {
                debug!(url, "Forced key set refresh suppressed by rate limit");
                return state.current.clone().ok_or_else(|| {
                    AuthError::KeySetUnavailable("key set refresh rate limited".to_string())
                });
            }
        }

        info!(url, "Unknown kid, forcing key set refresh");
        self.fetch_into(slot, url).await
    }

    /// Fetch and parse; caller must hold `slot.refresh`.
    async fn fetch_into(&self, slot: &DocumentSlot, url: &str) -> Result<CachedKeySet, AuthError> {
        let result = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(url)).await {
            Ok(Ok(body)) => KeySet::parse(&body),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AuthError::KeySetUnavailable(format!(
                "key document fetch timed out after {:?}",
                self.fetch_timeout
            ))),
        };

        let mut state = slot.state.write().await;
        state.attempts += 1;
        state.last_attempt = Some(Instant::now());
        match result {
            Ok(keys) => {
                if keys.is_empty() {
                    warn!(url, "Key document has no usable signing keys");
                }
                info!(url, keys = keys.len(), "Signing key set refreshed");
                let entry = CachedKeySet {
                    keys: Arc::new(keys),
                    fetched_at: Instant::now(),
                };
                state.current = Some(entry.clone());
                state.last_error = None;
                Ok(entry)
            }
            Err(err) => {
                warn!(url, error = %err, "Signing key set fetch failed");
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn fresh(&self, state: &SlotState) -> Option<CachedKeySet> {
        state
            .current
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
            .cloned()
    }
}
