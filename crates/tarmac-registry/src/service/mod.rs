//! Fetch-or-cache layer over the registry client.
//!
//! Version lists get a short TTL because new versions are published
//! continuously; per-version manifests are immutable once published and
//! get a long TTL. Negative lookups are cached briefly so missing
//! packages cannot trigger retry storms against the registry.
//!
//! Concurrent misses for the same key are not deduplicated; each proceeds
//! independently and the last writer wins, which is acceptable because
//! registry reads are idempotent and cheap relative to archive fetches.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::api::{clean_package_config, VersionsAndTags};
use crate::cache::MetadataCache;
use crate::client::RegistryClient;
use crate::RegistryResult;

const ONE_MINUTE: Duration = Duration::from_secs(60);
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Registry client plus shared metadata cache.
///
/// The single cross-request shared resource in the gateway; all methods
/// take `&self` and are safe to call concurrently.
#[derive(Debug)]
pub struct RegistryService {
    client: RegistryClient,
    cache: MetadataCache,
}

impl RegistryService {
    pub fn new(client: RegistryClient, cache: MetadataCache) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// The published versions and dist-tags for a package.
    ///
    /// Cached for one minute; `None` (package not found) is cached for
    /// five. Transient upstream failures are never cached.
    pub async fn versions_and_tags(
        &self,
        package_name: &str,
    ) -> RegistryResult<Option<VersionsAndTags>> {
        let cache_key = format!("versions-{package_name}");

        if let Some(cached) = self.cache.get(&cache_key) {
            if cached.is_empty() {
                return Ok(None);
            }
            match serde_json::from_str(&cached) {
                Ok(value) => return Ok(Some(value)),
                Err(error) => warn!(%cache_key, %error, "discarding corrupt cache entry"),
            }
        }

        match self.client.fetch_packument(package_name).await? {
            Some(packument) => {
                let value = VersionsAndTags::from(&packument);
                let serialized = serde_json::to_string(&value).unwrap_or_default();
                self.cache.insert(cache_key, serialized, ONE_MINUTE);
                Ok(Some(value))
            }
            None => {
                self.cache.insert(cache_key, String::new(), FIVE_MINUTES);
                Ok(None)
            }
        }
    }

    /// The cleaned manifest for one concrete `(name, version)` pair.
    ///
    /// Published versions are immutable, so positive results get a long
    /// TTL; "no such version" is cached for five minutes.
    pub async fn package_config(
        &self,
        package_name: &str,
        version: &str,
    ) -> RegistryResult<Option<Value>> {
        let cache_key = format!("config-{package_name}-{version}");

        if let Some(cached) = self.cache.get(&cache_key) {
            if cached.is_empty() {
                return Ok(None);
            }
            match serde_json::from_str(&cached) {
                Ok(value) => return Ok(Some(value)),
                Err(error) => warn!(%cache_key, %error, "discarding corrupt cache entry"),
            }
        }

        let config = self
            .client
            .fetch_packument(package_name)
            .await?
            .and_then(|packument| packument.versions.get(version).map(clean_package_config));

        match config {
            Some(config) => {
                let serialized = serde_json::to_string(&config).unwrap_or_default();
                self.cache.insert(cache_key, serialized, ONE_DAY);
                Ok(Some(config))
            }
            None => {
                self.cache.insert(cache_key, String::new(), FIVE_MINUTES);
                Ok(None)
            }
        }
    }

    /// Open the tarball stream for a concrete package version
    pub async fn tarball(
        &self,
        package_name: &str,
        version: &str,
    ) -> RegistryResult<Option<reqwest::Response>> {
        self.client.fetch_tarball(package_name, version).await
    }
}

#[cfg(test)]
mod tests;
