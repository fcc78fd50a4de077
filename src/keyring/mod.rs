//! Identity-provider signing key cache.
//!
//! [`KeyRing`] holds the provider's published JWKS as an immutable snapshot
//! keyed by `kid`. A snapshot younger than the TTL is served without network
//! access; an older one is replaced wholesale by the next caller that holds
//! the refresh lock. Readers only ever see a complete map.
//!
//! A failed fetch yields an empty map, even when a stale snapshot exists, so
//! every verification fails closed until the provider is reachable again.
//! The stale snapshot itself is left in place and the next call retries.
//! Callers that queued behind an attempt take its outcome instead of
//! fetching again, so an outage costs one fetch timeout per burst.

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

#[cfg(test)]
pub(crate) mod fixtures;

/// Key id to public key.
pub type KeyMap = HashMap<String, Jwk>;

/// Default snapshot lifetime (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Anything that can hand the verifier a key snapshot.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Current key map. Never fails; an empty map means no keys are usable.
    async fn get_keys(&self) -> Arc<KeyMap>;
}

struct Snapshot {
    keys: Arc<KeyMap>,
    fetched_at: Instant,
}

/// Lazily refreshed JWKS cache.
pub struct KeyRing {
    jwks_url: String,
    ttl: Duration,
    http: reqwest::Client,
    snapshot: RwLock<Option<Snapshot>>,
    /// Single writer for refreshes; holds the outcome of the latest attempt
    refresh: Mutex<Arc<KeyMap>>,
    /// Completed fetch attempts
    attempts: AtomicU64,
}

impl KeyRing {
    /// Creates an empty cache; nothing is fetched until the first call.
    pub fn new(jwks_url: impl Into<String>, ttl: Duration, fetch_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .context("Failed to build JWKS HTTP client")?;
        Ok(Self::with_client(jwks_url, ttl, http))
    }

    pub fn with_client(jwks_url: impl Into<String>, ttl: Duration, http: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            ttl,
            http,
            snapshot: RwLock::new(None),
            refresh: Mutex::new(Arc::new(KeyMap::new())),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn fresh(&self) -> Option<Arc<KeyMap>> {
        let guard = self.snapshot.read().await;
        guard
            .as_ref()
            .filter(|s| s.fetched_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.keys))
    }

    async fn fetch(&self) -> Result<KeyMap> {
        let jwks: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .context("JWKS request failed")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json()
            .await
            .context("JWKS payload is not a valid key set")?;

        let keys: KeyMap = jwks
            .keys
            .into_iter()
            .filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
            .collect();
        Ok(keys)
    }
}

#[async_trait]
impl KeySource for KeyRing {
    async fn get_keys(&self) -> Arc<KeyMap> {
        let seen = self.attempts.load(Ordering::Acquire);
        if let Some(keys) = self.fresh().await {
            return keys;
        }

        let mut latest = self.refresh.lock().await;
        // An attempt finished while we waited: share its outcome
        if self.attempts.load(Ordering::Acquire) != seen {
            return Arc::clone(&latest);
        }
        if let Some(keys) = self.fresh().await {
            return keys;
        }

        let keys = match self.fetch().await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                *self.snapshot.write().await = Some(Snapshot {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                });
                tracing::info!(jwks_url = %self.jwks_url, key_count = keys.len(), "Refreshed signing keys");
                keys
            }
            Err(e) => {
                tracing::warn!(jwks_url = %self.jwks_url, error = %format!("{:#}", e), "Signing key refresh failed, no keys available");
                Arc::new(KeyMap::new())
            }
        };

        *latest = Arc::clone(&keys);
        self.attempts.fetch_add(1, Ordering::Release);
        keys
    }
}

/// Fixed key map, for embedding callers that manage keys themselves.
pub struct StaticKeys {
    keys: Arc<KeyMap>,
}

impl StaticKeys {
    pub fn new(keys: KeyMap) -> Self {
        Self { keys: Arc::new(keys) }
    }

    /// Parses a JWKS document, keeping keys that carry a `kid`.
    pub fn from_jwks_json(json: &str) -> Result<Self> {
        let jwks: JwkSet = serde_json::from_str(json).context("Invalid JWKS document")?;
        Ok(Self::new(
            jwks.keys
                .into_iter()
                .filter_map(|jwk| jwk.common.key_id.clone().map(|kid| (kid, jwk)))
                .collect(),
        ))
    }
}

#[async_trait]
impl KeySource for StaticKeys {
    async fn get_keys(&self) -> Arc<KeyMap> {
        Arc::clone(&self.keys)
    }
}
