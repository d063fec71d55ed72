// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Behaviour
//!
//! - Keys are cached with a TTL (default 5 minutes) and refreshed in the
//!   background by [`JwksManager::run`].
//! - A failed fetch never drops an already-cached set: stale keys keep being
//!   served until a fetch succeeds again.
//! - A token whose `kid` is not in the cache triggers one refetch (key
//!   rotation), at most once every [`MIN_REFETCH_INTERVAL`].
//! - Fetch errors are logged with full detail; callers only ever see
//!   [`TokenError::KeySetUnavailable`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::TokenError;

/// Default JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Lower bound between two fetches triggered by request traffic.
pub const MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(10);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    last_attempt: Option<Instant>,
}

impl CacheState {
    fn may_fetch(&self) -> bool {
        self.last_attempt
            .is_none_or(|at| at.elapsed() >= MIN_REFETCH_INTERVAL)
    }
}

/// Key-set cache for one JWKS endpoint.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS endpoint
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Cached JWKS plus fetch bookkeeping
    state: Arc<RwLock<CacheState>>,
    /// HTTP client (timeout configured by the caller)
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a new JWKS manager.
    ///
    /// # Arguments
    /// - `jwks_url`: The JWKS endpoint URL (e.g., `https://idp/realms/master/protocol/openid-connect/certs`)
    /// - `client`: shared HTTP client; its timeout bounds every fetch
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            state: Arc::new(RwLock::new(CacheState::default())),
            client,
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Current key set: fresh cache, else a fetch, else the stale cache.
    async fn get_jwks(&self) -> Result<JwkSet, TokenError> {
        {
            let state = self.state.read().await;
            match &state.entry {
                Some(entry) if entry.fetched_at.elapsed() < self.cache_ttl => {
                    return Ok(entry.jwks.clone());
                }
                Some(entry) if !state.may_fetch() => return Ok(entry.jwks.clone()),
                None if !state.may_fetch() => return Err(TokenError::KeySetUnavailable),
                _ => {}
            }
        }

        match self.refresh().await {
            Ok(jwks) => Ok(jwks),
            Err(err) => {
                let state = self.state.read().await;
                match &state.entry {
                    Some(entry) => {
                        warn!(jwks_url = %self.jwks_url, "Serving stale JWKS after failed refresh");
                        Ok(entry.jwks.clone())
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, String> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {} from JWKS endpoint", response.status()));
        }

        response.json::<JwkSet>().await.map_err(|e| e.to_string())
    }

    /// Decoding key for a token header.
    ///
    /// With a `kid`, the key must match it exactly; an unknown `kid` causes
    /// one rate-limited refetch. Without a `kid`, the first signing key of the
    /// header algorithm's family is used.
    pub async fn decoding_key(&self, kid: Option<&str>, alg: Algorithm) -> Result<DecodingKey, TokenError> {
        let jwks = self.get_jwks().await?;
        if let Some(jwk) = select_key(&jwks, kid, alg) {
            return jwk_to_decoding_key(jwk, alg);
        }

        let Some(kid) = kid else {
            return Err(TokenError::NoMatchingKey);
        };
        if !self.state.read().await.may_fetch() {
            return Err(TokenError::NoMatchingKey);
        }

        debug!(kid, jwks_url = %self.jwks_url, "Unknown key id, refetching JWKS");
        let jwks = self.refresh().await?;
        let jwk = select_key(&jwks, Some(kid), alg).ok_or(TokenError::NoMatchingKey)?;
        jwk_to_decoding_key(jwk, alg)
    }

    /// Force refresh the JWKS cache. The cached set survives a failure.
    pub async fn refresh(&self) -> Result<JwkSet, TokenError> {
        self.state.write().await.last_attempt = Some(Instant::now());

        match self.fetch_jwks().await {
            Ok(jwks) => {
                let mut state = self.state.write().await;
                state.entry = Some(CacheEntry {
                    jwks: jwks.clone(),
                    fetched_at: Instant::now(),
                });
                debug!(jwks_url = %self.jwks_url, keys = jwks.keys.len(), "JWKS refreshed");
                Ok(jwks)
            }
            Err(detail) => {
                warn!(jwks_url = %self.jwks_url, error = %detail, "Failed to fetch JWKS");
                Err(TokenError::KeySetUnavailable)
            }
        }
    }

    /// Make sure a key set is loaded, going through the same rate limit as
    /// request-time lookups.
    pub async fn ensure_loaded(&self) -> Result<(), TokenError> {
        self.get_jwks().await.map(|_| ())
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let state = self.state.read().await;
        state
            .entry
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    /// Whether any key set (fresh or stale) is available.
    pub async fn has_keys(&self) -> bool {
        self.state.read().await.entry.is_some()
    }

    /// Refresh the cache every `interval` until `shutdown` is cancelled.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(jwks.clone().run(interval, shutdown.clone()));
    /// ```
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(
            jwks_url = %self.jwks_url,
            interval_secs = interval.as_secs(),
            "JWKS refresher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!(jwks_url = %self.jwks_url, "JWKS refresher shutting down");
                return;
            }

            // Failures are logged inside refresh; the stale set stays in place.
            let _ = self.refresh().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = shutdown.cancelled() => {
                    info!(jwks_url = %self.jwks_url, "JWKS refresher shutting down");
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Ec,
    Oct,
    Okp,
}

fn algorithm_family(alg: Algorithm) -> KeyFamily {
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Oct,
        Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
        Algorithm::EdDSA => KeyFamily::Okp,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => KeyFamily::Rsa,
    }
}

fn key_family(jwk: &Jwk) -> KeyFamily {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => KeyFamily::Rsa,
        AlgorithmParameters::EllipticCurve(_) => KeyFamily::Ec,
        AlgorithmParameters::OctetKey(_) => KeyFamily::Oct,
        AlgorithmParameters::OctetKeyPair(_) => KeyFamily::Okp,
    }
}

/// Signing algorithm pinned by the JWK's `alg` member, if any.
fn pinned_algorithm(key_algorithm: KeyAlgorithm) -> Option<Algorithm> {
    match key_algorithm {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

fn is_signing_key(jwk: &Jwk) -> bool {
    !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
}

fn select_key<'a>(jwks: &'a JwkSet, kid: Option<&str>, alg: Algorithm) -> Option<&'a Jwk> {
    let mut candidates = jwks.keys.iter().filter(|jwk| is_signing_key(jwk));
    match kid {
        Some(kid) => candidates.find(|jwk| jwk.common.key_id.as_deref() == Some(kid)),
        None => candidates.find(|jwk| key_family(jwk) == algorithm_family(alg)),
    }
}

/// Convert a JWK to a DecodingKey usable with `alg`.
fn jwk_to_decoding_key(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, TokenError> {
    if key_family(jwk) != algorithm_family(alg) {
        return Err(TokenError::InvalidAlgorithm);
    }
    if let Some(pinned) = jwk.common.key_algorithm.and_then(pinned_algorithm) {
        if pinned != alg {
            return Err(TokenError::InvalidAlgorithm);
        }
    }
    DecodingKey::from_jwk(jwk).map_err(|e| {
        warn!(kid = ?jwk.common.key_id, error = %e, "Unusable key in JWKS");
        TokenError::NoMatchingKey
    })
}
