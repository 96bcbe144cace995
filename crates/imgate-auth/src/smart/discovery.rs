//! SMART discovery document fetching and caching.
//!
//! The authorization server's endpoints are published by the EHR at
//! `{fhir_base_url}/.well-known/smart-configuration`. [`SmartDiscoveryCache`]
//! fetches that document on first use and keeps it, so the discovery call
//! happens at most once per engine no matter how many requests race for it.
//!
//! # Example
//!
//! ```ignore
//! use imgate_auth::smart::SmartDiscoveryCache;
//! use imgate_auth::config::DiscoveryConfig;
//!
//! let cache = SmartDiscoveryCache::new(
//!     reqwest::Client::new(),
//!     "https://ehr.example.com/fhir",
//!     DiscoveryConfig::default(),
//! );
//! let smart = cache.get().await?;
//! println!("Token endpoint: {}", smart.token_endpoint);
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::AuthResult;
use crate::config::DiscoveryConfig;
use crate::error::AuthError;

/// The parts of a SMART configuration document the gateway uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartConfiguration {
    /// OAuth token endpoint.
    pub token_endpoint: String,

    /// Token introspection endpoint. Some vendors omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    /// Authorization server issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// JWKS URL of the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
}

struct CachedConfiguration {
    document: Arc<SmartConfiguration>,
    fetched_at: Instant,
}

/// Lazily fetched, memoized SMART configuration for one EHR.
pub struct SmartDiscoveryCache {
    http: reqwest::Client,
    discovery_url: String,
    config: DiscoveryConfig,
    cached: RwLock<Option<CachedConfiguration>>,
    /// Serializes fetches so concurrent first callers share one request.
    fetch_lock: Mutex<()>,
}

impl SmartDiscoveryCache {
    /// Creates an empty cache for the EHR at `fhir_base_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, fhir_base_url: &str, config: DiscoveryConfig) -> Self {
        Self {
            http,
            discovery_url: format!(
                "{}/.well-known/smart-configuration",
                fhir_base_url.trim_end_matches('/')
            ),
            config,
            cached: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Returns the URL the document is fetched from.
    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Returns the SMART configuration, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamDiscovery` if the document cannot be
    /// fetched, is too large, is not JSON, or lacks a `token_endpoint`.
    /// Failures are not cached; the next call tries again.
    pub async fn get(&self) -> AuthResult<Arc<SmartConfiguration>> {
        if let Some(document) = self.fresh().await {
            tracing::trace!(url = %self.discovery_url, "SMART discovery cache hit");
            return Ok(document);
        }

        let _guard = self.fetch_lock.lock().await;

        // Another caller may have populated the cache while we waited.
        if let Some(document) = self.fresh().await {
            return Ok(document);
        }

        let document = Arc::new(self.fetch().await?);
        *self.cached.write().await = Some(CachedConfiguration {
            document: Arc::clone(&document),
            fetched_at: Instant::now(),
        });

        Ok(document)
    }

    /// Drops the cached document so the next [`get`](Self::get) refetches it.
    ///
    /// Library API only; the gateway itself never calls it.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
        tracing::info!(url = %self.discovery_url, "SMART discovery cache invalidated");
    }

    async fn fresh(&self) -> Option<Arc<SmartConfiguration>> {
        let cached = self.cached.read().await;
        let entry = cached.as_ref()?;
        match self.config.refresh_interval {
            Some(interval) if entry.fetched_at.elapsed() >= interval => None,
            _ => Some(Arc::clone(&entry.document)),
        }
    }

    async fn fetch(&self) -> AuthResult<SmartConfiguration> {
        let response = self
            .http
            .get(&self.discovery_url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.discovery_url, error = %e, "SMART discovery request failed");
                AuthError::upstream_discovery(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.discovery_url, status = status.as_u16(), "SMART discovery returned an error status");
            return Err(AuthError::upstream_discovery(format!(
                "status {}",
                status.as_u16()
            )));
        }

        let max_size = self.config.max_response_size;
        if let Some(len) = response.content_length()
            && len as usize > max_size
        {
            return Err(AuthError::upstream_discovery(format!(
                "document exceeds maximum size of {max_size} bytes"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::upstream_discovery(e.to_string()))?;
        if body.len() > max_size {
            return Err(AuthError::upstream_discovery(format!(
                "document exceeds maximum size of {max_size} bytes"
            )));
        }

        let document: SmartConfiguration = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(url = %self.discovery_url, error = %e, "SMART discovery document is invalid");
            AuthError::upstream_discovery(format!("invalid document: {e}"))
        })?;

        if document.token_endpoint.trim().is_empty() {
            return Err(AuthError::upstream_discovery("token_endpoint is empty"));
        }

        tracing::debug!(
            url = %self.discovery_url,
            token_endpoint = %document.token_endpoint,
            "Fetched SMART configuration"
        );

        Ok(document)
    }
}
